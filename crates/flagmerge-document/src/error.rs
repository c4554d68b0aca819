//! Error types for document parsing and hashing.

use std::io;

/// Errors produced while reading, validating or hashing a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document: {0}")]
    Schema(String),

    #[error("JCS canonicalization error: {0}")]
    Jcs(String),
}

impl DocumentError {
    /// True when the failure came from the filesystem rather than the content.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
