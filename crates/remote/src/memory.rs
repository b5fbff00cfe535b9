//! In-process stand-in for the remote services.
//!
//! Used by `--dry-run` and by tests, which inspect the call counters to
//! assert idempotency.

use parking_lot::Mutex;
use ppt_core::{Error, Lookup, ProgressSink, Result};
use ppt_pptx::rels::{rels_path_for, RelationshipFile, HYPERLINK_REL};
use ppt_pptx::Package;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::service::{
    EditRequest, Ledger, ObjectStore, PageElement, PresentationConverter, PresentationEditor, RemoteFile,
};

/// Chunk size used when reporting simulated upload progress.
const SIMULATED_CHUNK: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
struct StoredFile {
    name: String,
    url: String,
    size: u64,
    public: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    files: BTreeMap<String, StoredFile>,
    pages: HashMap<String, Vec<PageElement>>,
    batches: Vec<(String, Vec<EditRequest>)>,
    rows: Vec<Vec<String>>,
    uploads: usize,
    conversions: usize,
    permission_grants: usize,
}

impl State {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem{:04}", self.next_id)
    }
}

/// Every remote service, held in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a file with this display name already exists remotely.
    pub fn insert_file(&self, name: &str) -> RemoteFile {
        let mut state = self.state.lock();
        let id = state.new_id();
        let url = file_url(&id);
        state.files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                url: url.clone(),
                size: 0,
                public: false,
            },
        );
        RemoteFile { id, url }
    }

    /// Pretend a row with this id is already in the ledger.
    pub fn insert_row(&self, row: Vec<String>) {
        self.state.lock().rows.push(row);
    }

    /// Number of binary uploads performed.
    pub fn uploads(&self) -> usize {
        self.state.lock().uploads
    }

    /// Number of presentations uploaded for conversion.
    pub fn conversions(&self) -> usize {
        self.state.lock().conversions
    }

    pub fn permission_grants(&self) -> usize {
        self.state.lock().permission_grants
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.state.lock().rows.clone()
    }

    pub fn batches(&self) -> Vec<(String, Vec<EditRequest>)> {
        self.state.lock().batches.clone()
    }

    pub fn is_public(&self, id: &str) -> bool {
        self.state.lock().files.get(id).is_some_and(|f| f.public)
    }

    pub fn file_size(&self, id: &str) -> Option<u64> {
        self.state.lock().files.get(id).map(|f| f.size)
    }

    fn store(&self, source: &Path, name: &str, url_for: fn(&str) -> String, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        let size = std::fs::metadata(source)?.len();
        let mut sent = 0;
        while sent < size {
            sent = (sent + SIMULATED_CHUNK).min(size);
            sink.on_progress(sent, size, name);
        }

        let mut state = self.state.lock();
        let id = state.new_id();
        let url = url_for(&id);
        state.files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                url: url.clone(),
                size,
                public: false,
            },
        );
        Ok(RemoteFile { id, url })
    }
}

fn file_url(id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view?usp=drivesdk", id)
}

fn presentation_url(id: &str) -> String {
    format!("https://docs.google.com/presentation/d/{}/edit?usp=drivesdk", id)
}

impl ObjectStore for MemoryBackend {
    fn find_by_name(&self, name: &str) -> Result<Lookup<RemoteFile>> {
        let state = self.state.lock();
        Ok(state
            .files
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, f)| RemoteFile {
                id: id.clone(),
                url: f.url.clone(),
            })
            .into())
    }

    fn upload(&self, source: &Path, name: &str, _mime: &str, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        let file = self.store(source, name, file_url, sink)?;
        self.state.lock().uploads += 1;
        log::debug!("[memory] uploaded '{}' as {}", name, file.id);
        Ok(file)
    }

    fn set_public_readable(&self, id: &str) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let file = state
            .files
            .get_mut(id)
            .ok_or_else(|| Error::remote("memory", format!("no file {}", id)))?;
        if !file.public {
            file.public = true;
            state.permission_grants += 1;
        }
        Ok(())
    }
}

impl PresentationConverter for MemoryBackend {
    /// Image click-through links of the package become linked page
    /// elements, the way a hosted conversion exposes them.
    fn upload_and_convert(&self, source: &Path, name: &str, sink: &dyn ProgressSink) -> Result<RemoteFile> {
        let elements = linked_elements(source)?;
        let file = self.store(source, name, presentation_url, sink)?;
        let mut state = self.state.lock();
        state.conversions += 1;
        state.pages.insert(file.id.clone(), elements);
        log::debug!("[memory] converted '{}' as {}", name, file.id);
        Ok(file)
    }
}

impl PresentationEditor for MemoryBackend {
    fn page_elements(&self, presentation_id: &str) -> Result<Vec<PageElement>> {
        let state = self.state.lock();
        if !state.files.contains_key(presentation_id) {
            return Err(Error::remote("memory", format!("no presentation {}", presentation_id)));
        }
        Ok(state.pages.get(presentation_id).cloned().unwrap_or_default())
    }

    fn batch_update(&self, presentation_id: &str, requests: &[EditRequest]) -> Result<()> {
        let mut state = self.state.lock();
        let elements = state.pages.entry(presentation_id.to_string()).or_default();
        for request in requests {
            match request {
                EditRequest::DeleteObject { object_id } => elements.retain(|e| &e.object_id != object_id),
                EditRequest::CreateVideo {
                    page_id,
                    video_id,
                    size,
                    transform,
                } => elements.push(PageElement {
                    object_id: format!("video_{}", video_id),
                    page_id: page_id.clone(),
                    link_url: None,
                    size: size.clone(),
                    transform: transform.clone(),
                }),
            }
        }
        state.batches.push((presentation_id.to_string(), requests.to_vec()));
        Ok(())
    }
}

impl Ledger for MemoryBackend {
    fn existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .state
            .lock()
            .rows
            .iter()
            .filter_map(|r| r.first().cloned())
            .collect())
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        self.state.lock().rows.extend(rows.iter().cloned());
        Ok(())
    }
}

/// One page element per external hyperlink on each slide.
fn linked_elements(source: &Path) -> Result<Vec<PageElement>> {
    let mut pkg = Package::open(source)?;
    let slides: Vec<String> = pkg
        .part_names()
        .into_iter()
        .filter(|p| p.starts_with("ppt/slides/") && !p.contains("/_rels/") && p.ends_with(".xml"))
        .collect();

    let mut elements = Vec::new();
    for slide in slides {
        let rels_name = rels_path_for(&slide);
        let Some(bytes) = pkg.read_part(&rels_name)? else {
            continue;
        };
        let page_id = ppt_pptx::media::basename(&slide).trim_end_matches(".xml").to_string();
        for rel in RelationshipFile::parse_lenient(&bytes, &rels_name).entries {
            if rel.external && rel.rel_type == HYPERLINK_REL {
                elements.push(PageElement {
                    object_id: format!("{}_{}", page_id, rel.id),
                    page_id: page_id.clone(),
                    link_url: Some(rel.target),
                    size: None,
                    transform: None,
                });
            }
        }
    }
    Ok(elements)
}
