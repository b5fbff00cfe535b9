//! Boundaries to the remote storage, conversion, editing and ledger services.

use ppt_core::{Lookup, ProgressSink, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// MIME type of a .pptx package.
pub const PPTX_MIME: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// A file held by a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    /// Link for people to open the file.
    pub url: String,
}

/// Remote binary storage, addressed by display name.
pub trait ObjectStore {
    /// The file with exactly this display name, if any.
    fn find_by_name(&self, name: &str) -> Result<Lookup<RemoteFile>>;

    /// Upload a local file in resumable chunks, reporting bytes sent.
    fn upload(&self, source: &Path, name: &str, mime: &str, sink: &dyn ProgressSink) -> Result<RemoteFile>;

    /// Let anyone with the link read the file. Safe to repeat.
    fn set_public_readable(&self, id: &str) -> Result<()>;
}

/// Uploads a package and converts it to a hosted presentation.
pub trait PresentationConverter {
    fn upload_and_convert(&self, source: &Path, name: &str, sink: &dyn ProgressSink) -> Result<RemoteFile>;
}

/// One element on a page of a hosted presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub object_id: String,
    pub page_id: String,
    /// Click-through link of an image element.
    pub link_url: Option<String>,
    pub size: Option<Value>,
    pub transform: Option<Value>,
}

/// A change to a hosted presentation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditRequest {
    DeleteObject {
        object_id: String,
    },
    /// Insert a video hosted by the object store.
    CreateVideo {
        page_id: String,
        video_id: String,
        size: Option<Value>,
        transform: Option<Value>,
    },
}

pub trait PresentationEditor {
    fn page_elements(&self, presentation_id: &str) -> Result<Vec<PageElement>>;

    /// Apply all requests atomically.
    fn batch_update(&self, presentation_id: &str, requests: &[EditRequest]) -> Result<()>;
}

/// Append-only table of published jobs.
pub trait Ledger {
    /// Ids already recorded (first column).
    fn existing_ids(&self) -> Result<HashSet<String>>;

    fn append_rows(&self, rows: &[Vec<String>]) -> Result<()>;
}

/// The full set of remote collaborators a pipeline run talks to.
#[derive(Clone)]
pub struct RemoteServices {
    pub store: Arc<dyn ObjectStore>,
    pub converter: Arc<dyn PresentationConverter>,
    pub editor: Arc<dyn PresentationEditor>,
    pub ledger: Arc<dyn Ledger>,
}

impl RemoteServices {
    /// Use one backend for every service.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ObjectStore + PresentationConverter + PresentationEditor + Ledger + 'static,
    {
        Self {
            store: backend.clone(),
            converter: backend.clone(),
            editor: backend.clone(),
            ledger: backend,
        }
    }
}
