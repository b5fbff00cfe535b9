//! Core domain types, persisted state and pipeline bookkeeping for
//! splitting and publishing slide decks.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod progress;
pub mod store;
pub mod types;
pub mod validate;

pub use checkpoint::{Checkpoint, Stage};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use progress::{LogSink, NullSink, ProgressSink};
pub use store::{JobHistory, JsonFileStore, Store};
pub use types::{display_name, Job, JobResult, Lookup, VideoMap};
pub use validate::validate_jobs;
