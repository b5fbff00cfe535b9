//! Cheap content fingerprint of a source file.
//!
//! Combines size, modification time and a SHA-256 over a head and a tail
//! window. Files no larger than two windows are hashed whole.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::{Error, Result};

/// Default size of each hashed window.
pub const DEFAULT_WINDOW: u64 = 1024 * 1024;

/// Identity of a source file for checkpoint matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    /// Modification time in whole seconds since the Unix epoch.
    pub modified: u64,
    /// Hex SHA-256 of the sampled windows.
    pub digest: String,
}

impl Fingerprint {
    /// Assemble a fingerprint from known parts.
    pub fn from_parts(size: u64, modified: u64, digest: impl Into<String>) -> Self {
        Self {
            size,
            modified,
            digest: digest.into(),
        }
    }

    /// Fingerprint the file at `path`, sampling `window` bytes at each end.
    pub fn of_file(path: &Path, window: u64) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingSource(path.display().to_string()));
        }
        let mut file = File::open(path)?;
        let meta = file.metadata()?;
        let size = meta.len();
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(size.to_le_bytes());

        if size <= window.saturating_mul(2) {
            std::io::copy(&mut file, &mut HashWriter(&mut hasher))?;
        } else {
            let mut head = (&mut file).take(window);
            std::io::copy(&mut head, &mut HashWriter(&mut hasher))?;
            file.seek(SeekFrom::End(-(window as i64)))?;
            std::io::copy(&mut file, &mut HashWriter(&mut hasher))?;
        }

        Ok(Self {
            size,
            modified,
            digest: format!("{:x}", hasher.finalize()),
        })
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}B@{}:{}", self.size, self.modified, short)
    }
}

struct HashWriter<'a>(&'a mut Sha256);

impl std::io::Write for HashWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        std::fs::write(&path, vec![7u8; 5000]).unwrap();

        let a = Fingerprint::of_file(&path, 1024).unwrap();
        let b = Fingerprint::of_file(&path, 1024).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size, 5000);
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn test_fingerprint_sees_tail_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let mut data = vec![1u8; 10_000];
        std::fs::write(&path, &data).unwrap();
        let before = Fingerprint::of_file(&path, 1024).unwrap();

        *data.last_mut().unwrap() = 2;
        std::fs::write(&path, &data).unwrap();
        let after = Fingerprint::of_file(&path, 1024).unwrap();
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Fingerprint::of_file(&dir.path().join("nope.pptx"), 1024).unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
    }
}
