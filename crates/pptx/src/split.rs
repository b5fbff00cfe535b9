//! Cutting a deck down to one contiguous slide range.

use ppt_core::{Error, Result};
use std::path::Path;

use crate::compactor::{CompactionReport, Compactor};
use crate::container::Package;
use crate::presentation::keep_slide_range;
use crate::rels::{RelationshipFile, DEFAULT_MAIN_DOCUMENT, ROOT_RELS};

/// Outcome of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub compaction: CompactionReport,
    /// Size of the written sub-package in bytes.
    pub size_bytes: u64,
}

/// Write the slides at 1-based positions `start..=end` of `src` to `dest`
/// as a self-contained package.
pub fn split(src: &Path, start: usize, end: usize, dest: &Path) -> Result<SplitReport> {
    let mut pkg = Package::open(src)?;
    let main = main_document(&mut pkg)?;
    let xml = pkg
        .read_part(&main)?
        .ok_or_else(|| Error::PptxParseError(format!("main document '{}' not found", main)))?;
    drop(pkg);

    let (trimmed, removed) = keep_slide_range(&xml, start, end)?;
    log::debug!("Slides {}-{}: removed {} entries from the slide list", start, end, removed.len());

    let compaction = Compactor::new().with_part(main, trimmed).compact(src, dest)?;
    let size_bytes = std::fs::metadata(dest)?.len();
    log::info!(
        "Split slides {}-{} into {} ({:.1} MB)",
        start,
        end,
        dest.display(),
        size_bytes as f64 / (1024.0 * 1024.0)
    );
    Ok(SplitReport { compaction, size_bytes })
}

/// Path of the main document named by the root manifest.
pub fn main_document(pkg: &mut Package) -> Result<String> {
    let from_manifest = match pkg.read_part(ROOT_RELS)? {
        Some(bytes) => RelationshipFile::parse_lenient(&bytes, ROOT_RELS)
            .entries
            .iter()
            .find(|r| r.is_main_document())
            .and_then(|r| r.resolve("")),
        None => None,
    };
    Ok(from_manifest
        .filter(|p| pkg.contains(p))
        .unwrap_or_else(|| DEFAULT_MAIN_DOCUMENT.to_string()))
}
