//! Layout of the working directory shared by all stages.

use ppt_core::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// The working directory of one source deck.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory tree if needed.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(self.media_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a downloaded source is kept.
    pub fn source(&self) -> PathBuf {
        self.root.join("source.pptx")
    }

    /// Output of placeholder substitution.
    pub fn modified(&self) -> PathBuf {
        self.root.join("modified.pptx")
    }

    /// Output of image shrinking.
    pub fn slim(&self) -> PathBuf {
        self.root.join("slim.pptx")
    }

    /// Transient sub-package of one job.
    pub fn split(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("split_{}.pptx", sanitize(job_id)))
    }

    pub fn results(&self) -> PathBuf {
        self.root.join("results.json")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    /// Harvested video links for uploads named with `prefix`.
    pub fn video_map(&self, prefix: &str) -> PathBuf {
        if prefix.is_empty() {
            self.root.join("video_map.json")
        } else {
            self.root.join(format!("video_map_{}.json", sanitize(prefix)))
        }
    }

    /// Scratch space for extracted videos.
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// Remove every derived artifact of a previous source. Video maps are
    /// kept: their links stay valid for any deck.
    pub fn reset_artifacts(&self) -> Result<()> {
        for path in [self.modified(), self.slim(), self.results(), self.checkpoint()] {
            remove_if_exists(&path)?;
        }
        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let path = entry?.path();
                let transient = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("split_") && n.ends_with(".pptx"));
                if transient {
                    remove_if_exists(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Delete the whole working directory.
    pub fn clean(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            log::info!("Removed {}", self.root.display());
        }
        Ok(())
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Keep a name safe for use as a file name component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
