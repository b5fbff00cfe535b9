//! Pre-flight validation of a job list against a deck.

use std::collections::HashSet;

use crate::Job;

/// Check every job against `total_slides` and against each other.
///
/// Returns one message per problem; an empty list means the jobs can run.
pub fn validate_jobs(jobs: &[Job], total_slides: usize) -> Vec<String> {
    let mut errors = Vec::new();

    for job in jobs {
        let label = if job.filename.trim().is_empty() {
            format!("job {} (unnamed)", job.id)
        } else {
            format!("job {} ({})", job.id, job.filename)
        };

        if job.filename.trim().is_empty() {
            errors.push(format!("{}: file name must not be empty", label));
        }
        if job.start < 1 {
            errors.push(format!("{}: start slide must be at least 1", label));
        }
        if job.start > job.end {
            errors.push(format!(
                "{}: start slide {} is after end slide {}",
                label, job.start, job.end
            ));
        }
        if job.end > total_slides {
            errors.push(format!(
                "{}: end slide {} exceeds deck length {}",
                label, job.end, total_slides
            ));
        }
    }

    // Results, split files and ledger rows are all keyed by id.
    let mut ids = HashSet::new();
    let mut reported = HashSet::new();
    for job in jobs {
        if job.id.trim().is_empty() {
            errors.push(format!("job {}: id must not be empty", job.filename));
        } else if !ids.insert(job.id.as_str()) && reported.insert(job.id.as_str()) {
            errors.push(format!("duplicate job id '{}'", job.id));
        }
    }

    let mut sorted: Vec<&Job> = jobs.iter().collect();
    sorted.sort_by_key(|j| j.start);
    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.end >= b.start {
            errors.push(format!(
                "overlapping ranges: {} ({}-{}) and {} ({}-{}) both include slides {}-{}",
                a.filename, a.start, a.end, b.filename, b.start, b.end, b.start, a.end.min(b.end)
            ));
        }
    }

    errors
}
