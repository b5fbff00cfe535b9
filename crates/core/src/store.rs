//! Local persisted state.
//!
//! Every artifact is a single JSON document. Writes go to a temporary file
//! in the same directory, are flushed to disk and then atomically renamed
//! over the target, so a crash never leaves a half-written file behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::{Job, Result};

/// Load/save contract for one persisted value.
///
/// `load` returns the default value when nothing has been stored yet.
/// `save` is atomic: readers observe either the old or the new document.
pub trait Store<T> {
    fn load(&self) -> Result<T>;
    fn save(&self, value: &T) -> Result<()>;
}

/// A [`Store`] backed by a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Store<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<T> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                // A torn or hand-edited file is treated as absent state.
                log::warn!("Ignoring unreadable {}: {}", self.path.display(), e);
                Ok(T::default())
            }
        }
    }

    fn save(&self, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path, &json)?;
        log::debug!("Saved {}", self.path.display());
        Ok(())
    }
}

/// Write `bytes` to `path` via temp file, fsync and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Saved job lists keyed by source file name.
pub type JobHistory = BTreeMap<String, Vec<Job>>;

/// Read the stored jobs for `source_name`, or an empty list.
pub fn load_history(store: &dyn Store<JobHistory>, source_name: &str) -> Result<Vec<Job>> {
    Ok(store.load()?.remove(source_name).unwrap_or_default())
}

/// Replace the stored jobs for `source_name` (read-modify-write).
pub fn save_history(store: &dyn Store<JobHistory>, source_name: &str, jobs: &[Job]) -> Result<()> {
    let mut history = store.load()?;
    history.insert(source_name.to_string(), jobs.to_vec());
    store.save(&history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Checkpoint, Stage, VideoMap};

    #[test]
    fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileStore<VideoMap> = JsonFileStore::new(dir.path().join("map.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state/checkpoint.json"));
        let cp = Checkpoint {
            stage: Stage::ShrinkDone,
            fingerprint: None,
            timestamp: Some("2024-01-01T00:00:00Z".into()),
        };
        store.save(&cp).unwrap();
        assert_eq!(store.load().unwrap(), cp);

        // No temp files are left next to the target.
        let leftovers = fs::read_dir(dir.path().join("state")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_corrupt_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "{\"stage\": \"videosDo").unwrap();
        let store: JsonFileStore<Checkpoint> = JsonFileStore::new(&path);
        assert_eq!(store.load().unwrap().stage, Stage::None);
    }

    #[test]
    fn test_history_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileStore<JobHistory> = JsonFileStore::new(dir.path().join("job_history.json"));
        save_history(&store, "a.pptx", &[Job::new("1", "one", 1, 2)]).unwrap();
        save_history(&store, "b.pptx", &[Job::new("2", "two", 3, 4)]).unwrap();

        let a = load_history(&store, "a.pptx").unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].filename, "one");
        assert!(load_history(&store, "c.pptx").unwrap().is_empty());
    }
}
