//! Remote collaborators of the publishing pipeline.
//!
//! The pipeline only sees the traits in [`service`]; [`google`] talks to
//! Drive, Slides and Sheets, and [`memory`] keeps everything in process.

pub mod fetch;
pub mod google;
pub mod memory;
pub mod service;

pub use fetch::{fetch_source, is_url};
pub use google::{GoogleClient, GoogleConfig};
pub use memory::MemoryBackend;
pub use service::{
    EditRequest, Ledger, ObjectStore, PageElement, PresentationConverter, PresentationEditor, RemoteFile,
    RemoteServices, PPTX_MIME,
};
