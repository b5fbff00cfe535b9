//! Streaming access to a ZIP-based package and atomic rewriting of a new one.

use ppt_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::rels::normalize_part_path;

/// An open package, read entry by entry.
pub struct Package {
    archive: ZipArchive<BufReader<File>>,
    /// Normalized part name -> name as stored in the archive.
    names: BTreeMap<String, String>,
}

impl Package {
    /// Open the package at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingSource(path.display().to_string()));
        }
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::ZipError(format!("Failed to open ZIP '{}': {}", path.display(), e)))?;

        let names = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(|n| (normalize_part_path(n), n.to_string()))
            .collect();

        Ok(Self { archive, names })
    }

    /// Normalized names of every part, in sorted order.
    pub fn part_names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    pub fn contains(&self, part: &str) -> bool {
        self.names.contains_key(part)
    }

    /// Uncompressed size of a part.
    pub fn part_size(&mut self, part: &str) -> Result<u64> {
        let raw = self.raw_name(part)?;
        let file = self
            .archive
            .by_name(&raw)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", part, e)))?;
        Ok(file.size())
    }

    /// Read a whole part, or `None` if it does not exist.
    pub fn read_part(&mut self, part: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.names.get(part).cloned() else {
            return Ok(None);
        };
        let mut file = self
            .archive
            .by_name(&raw)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", part, e)))?;
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", part, e)))?;
        Ok(Some(content))
    }

    /// Stream a part into `out` without buffering it whole.
    pub fn extract_part(&mut self, part: &str, out: &mut dyn Write) -> Result<u64> {
        let raw = self.raw_name(part)?;
        let mut file = self
            .archive
            .by_name(&raw)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", part, e)))?;
        Ok(std::io::copy(&mut file, out)?)
    }

    fn raw_name(&self, part: &str) -> Result<String> {
        self.names
            .get(part)
            .cloned()
            .ok_or_else(|| Error::ZipError(format!("File not found in archive '{}'", part)))
    }
}

/// Writes a new package next to its destination and renames it into place
/// on [`PackageWriter::finish`]. Dropping an unfinished writer discards it.
pub struct PackageWriter {
    zip: ZipWriter<File>,
    tmp: NamedTempFile,
    dest: PathBuf,
}

impl PackageWriter {
    /// Start a package that will replace `dest` when finished.
    pub fn create(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        let zip = ZipWriter::new(tmp.as_file().try_clone()?);
        Ok(Self {
            zip,
            tmp,
            dest: dest.to_path_buf(),
        })
    }

    fn options() -> FileOptions {
        FileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    /// Write a part from memory.
    pub fn write_part(&mut self, part: &str, bytes: &[u8]) -> Result<()> {
        self.zip
            .start_file(part, Self::options())
            .map_err(|e| Error::ZipError(format!("Failed to start '{}': {}", part, e)))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    /// Copy a part verbatim, without decompressing it.
    pub fn copy_part(&mut self, from: &mut Package, part: &str) -> Result<()> {
        let raw = from.raw_name(part)?;
        let file = from
            .archive
            .by_name(&raw)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", part, e)))?;
        let copied = if raw == part {
            self.zip.raw_copy_file(file)
        } else {
            self.zip.raw_copy_file_rename(file, part)
        };
        copied.map_err(|e| Error::ZipError(format!("Failed to copy '{}': {}", part, e)))
    }

    /// Finish the archive, flush it to disk and atomically move it into place.
    pub fn finish(mut self) -> Result<PathBuf> {
        let file = self
            .zip
            .finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish archive: {}", e)))?;
        file.sync_all()?;
        drop(file);
        self.tmp.persist(&self.dest).map_err(|e| e.error)?;
        log::debug!("Wrote {}", self.dest.display());
        Ok(self.dest)
    }
}

/// Atomically copy `src` to `dest` byte for byte.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut input = File::open(src)?;
    std::io::copy(&mut input, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
