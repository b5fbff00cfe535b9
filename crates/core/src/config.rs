//! Tunable limits and remote settings for a pipeline run.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Images smaller than this are copied as-is.
pub const DEFAULT_IMAGE_THRESHOLD: u64 = 50 * 1024;
/// Neither image dimension may exceed this after shrinking.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1280;
pub const DEFAULT_JPEG_QUALITY: u8 = 50;
/// Hard ceiling imposed by the remote conversion service.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
/// Must stay a multiple of 256 KiB for resumable uploads.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Settings for every stage; each field falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_threshold_bytes: u64,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub max_upload_bytes: u64,
    pub upload_chunk_bytes: u64,
    pub fingerprint_window_bytes: u64,
    /// Spreadsheet holding the publication ledger.
    pub ledger_spreadsheet_id: String,
    pub ledger_sheet: String,
    /// Written verbatim into the ledger's permitted-admins column.
    pub permitted_admins: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_threshold_bytes: DEFAULT_IMAGE_THRESHOLD,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_chunk_bytes: DEFAULT_CHUNK_SIZE,
            fingerprint_window_bytes: crate::fingerprint::DEFAULT_WINDOW,
            ledger_spreadsheet_id: String::new(),
            ledger_sheet: "Presentations".to_string(),
            permitted_admins: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
