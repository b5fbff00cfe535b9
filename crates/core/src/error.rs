//! Error types for deck processing and publishing.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while processing or publishing a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write a local file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Persisted JSON state could not be encoded or decoded.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Failed to parse the PPTX package structure.
    #[error("PPTX parsing error: {0}")]
    PptxParseError(String),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    XmlError(String),

    /// Raster image decode/encode error.
    #[error("Image error: {0}")]
    ImageError(String),

    /// The source deck does not exist.
    #[error("Source file not found: {0}")]
    MissingSource(String),

    /// A job's slide range or metadata is unusable.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// A stage's input artifact is missing from the workspace.
    #[error("Stage artifact missing: {0}")]
    ArtifactMissing(String),

    /// The remote service rejected our credentials or permissions.
    #[error("Authorization error: {0}")]
    AuthError(String),

    /// The run was cancelled at a stage boundary.
    #[error("Cancelled before {0}")]
    Cancelled(String),

    /// A remote service call failed.
    #[error("{service} error: {message}")]
    RemoteError { service: String, message: String },
}

impl Error {
    /// Build a [`Error::RemoteError`] for the named service.
    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteError {
            service: service.into(),
            message: message.into(),
        }
    }
}
