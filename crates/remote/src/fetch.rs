//! Downloading a source deck given by URL.

use ppt_core::{Error, Result};
use reqwest::blocking::Client;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Whether `source` names a remote deck rather than a local path.
pub fn is_url(source: &str) -> bool {
    let lower = source.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Stream `url` into `dest`, replacing it atomically once complete.
pub fn fetch_source(url: &str, dest: &Path) -> Result<u64> {
    let client = Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| Error::remote("http", format!("Failed to create HTTP client: {}", e)))?;

    log::info!("Downloading {}", url);
    let mut response = client
        .get(url)
        .send()
        .map_err(|e| Error::remote("http", format!("GET {}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(Error::MissingSource(format!("{} returned {}", url, response.status())));
    }

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    let bytes = response
        .copy_to(&mut tmp)
        .map_err(|e| Error::remote("http", format!("reading {}: {}", url, e)))?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;

    log::info!("Saved {} ({:.1} MB)", dest.display(), bytes as f64 / (1024.0 * 1024.0));
    Ok(bytes)
}
