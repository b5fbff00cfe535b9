//! Extraction and upload of embedded videos.

use ppt_core::{display_name, Lookup, ProgressSink, Result, Store, VideoMap};
use ppt_pptx::media::{self, natural_cmp};
use ppt_pptx::Package;
use ppt_remote::ObjectStore;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::workspace::remove_if_exists;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub map: VideoMap,
    pub uploaded: usize,
    /// Found remotely under the expected name.
    pub reused: usize,
    /// Already in the local map; no remote call made.
    pub skipped: usize,
}

/// Uploads every embedded video once, remembering where each one went.
pub struct Harvester<'a> {
    pub store: &'a dyn ObjectStore,
    pub map_store: &'a dyn Store<VideoMap>,
    /// Display-name prefix for uploads.
    pub prefix: &'a str,
    /// Scratch directory for extracted binaries.
    pub media_dir: &'a Path,
}

impl Harvester<'_> {
    /// Resolve every video binary in `source` to a remote URL.
    ///
    /// The map is saved after each resolved video, so an interrupted run
    /// loses at most the upload in flight.
    pub fn run(&self, source: &Path, sink: &dyn ProgressSink) -> Result<HarvestReport> {
        let mut pkg = Package::open(source)?;
        let mut videos: Vec<String> = pkg.part_names().into_iter().filter(|p| media::is_video_part(p)).collect();
        videos.sort_by(|a, b| natural_cmp(media::basename(a), media::basename(b)));

        let mut report = HarvestReport {
            map: self.map_store.load()?,
            ..HarvestReport::default()
        };
        log::info!("Found {} embedded videos ({} already mapped)", videos.len(), report.map.len());

        for part in &videos {
            let name = media::basename(part).to_string();
            if report.map.lookup(&name).is_found() {
                log::debug!("{} already harvested", name);
                report.skipped += 1;
                continue;
            }

            let remote_name = display_name(self.prefix, &name);
            let file = match self.store.find_by_name(&remote_name)? {
                Lookup::Found(file) => {
                    log::info!("Using existing upload of {}", remote_name);
                    report.reused += 1;
                    file
                }
                Lookup::NotFound => {
                    std::fs::create_dir_all(self.media_dir)?;
                    let local = self.media_dir.join(&name);
                    {
                        let mut out = BufWriter::new(File::create(&local)?);
                        pkg.extract_part(part, &mut out)?;
                    }
                    let uploaded = self.store.upload(&local, &remote_name, mime_for(&name), sink);
                    remove_if_exists(&local)?;
                    let file = uploaded?;
                    report.uploaded += 1;
                    file
                }
            };
            self.store.set_public_readable(&file.id)?;

            report.map.record(name, file.url);
            self.map_store.save(&report.map)?;
        }

        // Persist even an empty map so the stage leaves an artifact.
        self.map_store.save(&report.map)?;
        log::info!(
            "Harvest: {} uploaded, {} reused, {} skipped",
            report.uploaded,
            report.reused,
            report.skipped
        );
        Ok(report)
    }
}

fn mime_for(name: &str) -> &'static str {
    match media::extension(name).as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("m4v") => "video/x-m4v",
        Some("wmv") => "video/x-ms-wmv",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("clip.MOV"), "video/quicktime");
        assert_eq!(mime_for("clip.mp4"), "video/mp4");
        assert_eq!(mime_for("clip"), "application/octet-stream");
    }
}
