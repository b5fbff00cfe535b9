//! Splitting the slim deck per job and publishing each part.

use ppt_core::{Job, Lookup, ProgressSink, Result, Store};
use ppt_remote::{ObjectStore, PresentationConverter};
use std::path::Path;

use crate::workspace::{remove_if_exists, Workspace};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub published: usize,
    /// Found remotely under the job's display name.
    pub reused: usize,
    /// Already carried a link.
    pub skipped: usize,
    /// Ids of jobs whose sub-package exceeds the upload ceiling.
    pub oversized: Vec<String>,
}

pub struct Publisher<'a> {
    pub store: &'a dyn ObjectStore,
    pub converter: &'a dyn PresentationConverter,
    pub workspace: &'a Workspace,
    pub prefix: &'a str,
    pub max_upload_bytes: u64,
}

impl Publisher<'_> {
    /// Publish every job of `jobs` from `slim`, saving the job list to
    /// `results` after each one.
    pub fn run(&self, slim: &Path, jobs: &mut [Job], results: &dyn Store<Vec<Job>>, sink: &dyn ProgressSink) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        let total = jobs.len();

        for idx in 0..total {
            let job = &mut jobs[idx];
            let name = job.display_name(self.prefix);

            if job.is_published() {
                log::info!("({}/{}) {} already published, skipping", idx + 1, total, name);
                report.skipped += 1;
                continue;
            }

            if let Lookup::Found(file) = self.store.find_by_name(&name)? {
                log::info!("({}/{}) {} already exists remotely, reusing it", idx + 1, total, name);
                job.result.final_link = Some(file.url);
                job.result.presentation_id = Some(file.id);
                clear_size_error(job);
                report.reused += 1;
                results.save(&jobs.to_vec())?;
                continue;
            }

            log::info!("({}/{}) Splitting slides {}-{} for {}", idx + 1, total, job.start, job.end, name);
            let part = self.workspace.split(&job.id);
            let split = ppt_pptx::split(slim, job.start, job.end, &part)?;

            if !within_ceiling(job, split.size_bytes, self.max_upload_bytes) {
                log::error!(
                    "{} is {:.2} MB after compaction, over the {:.0} MB limit",
                    name,
                    split.size_bytes as f64 / MB,
                    self.max_upload_bytes as f64 / MB
                );
                report.oversized.push(job.id.clone());
                remove_if_exists(&part)?;
                results.save(&jobs.to_vec())?;
                continue;
            }

            log::info!("({}/{}) Uploading {} ({:.2} MB)", idx + 1, total, name, split.size_bytes as f64 / MB);
            let uploaded = self.converter.upload_and_convert(&part, &name, sink);
            remove_if_exists(&part)?;
            let file = uploaded?;
            self.store.set_public_readable(&file.id)?;

            let job = &mut jobs[idx];
            job.result.final_link = Some(file.url);
            job.result.presentation_id = Some(file.id);
            report.published += 1;
            results.save(&jobs.to_vec())?;
        }

        log::info!(
            "Publish: {} uploaded, {} reused, {} skipped, {} oversized",
            report.published,
            report.reused,
            report.skipped,
            report.oversized.len()
        );
        Ok(report)
    }
}

/// Apply the upload size gate to `job`. Returns `false` and marks the job
/// when `size_bytes` is over `ceiling`.
pub fn within_ceiling(job: &mut Job, size_bytes: u64, ceiling: u64) -> bool {
    if size_bytes > ceiling {
        job.result.error_too_large = true;
        job.result.size_mb = Some(size_bytes as f64 / MB);
        false
    } else {
        clear_size_error(job);
        true
    }
}

fn clear_size_error(job: &mut Job) {
    job.result.error_too_large = false;
    job.result.size_mb = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppt_core::config::DEFAULT_MAX_UPLOAD_BYTES;

    #[test]
    fn test_size_gate_marks_oversized_job() {
        let mut job = Job::new("j1", "big", 1, 10);
        assert!(!within_ceiling(&mut job, 120 * 1024 * 1024, DEFAULT_MAX_UPLOAD_BYTES));
        assert!(job.result.error_too_large);
        let size = job.result.size_mb.unwrap();
        assert!((size - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_size_gate_clears_stale_error() {
        let mut job = Job::new("j1", "ok", 1, 10);
        job.result.error_too_large = true;
        job.result.size_mb = Some(130.0);
        assert!(within_ceiling(&mut job, 10 * 1024 * 1024, DEFAULT_MAX_UPLOAD_BYTES));
        assert!(!job.result.error_too_large);
        assert_eq!(job.result.size_mb, None);
        // Exactly at the ceiling is allowed.
        assert!(within_ceiling(&mut job, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES));
    }
}
