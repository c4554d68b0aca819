//! Merge base storage
//!
//! The merge base is the last merged document for a configuration. Stores
//! are keyed by the configuration's artifact name (the source file stem for
//! file-backed stores).

mod file;
mod lock;
mod memory;

pub use file::{artifact_path_for, is_artifact_path, FileStore};
pub use lock::{ArtifactLock, LockError};
pub use memory::MemoryStore;

use std::io;
use std::path::PathBuf;

use flagmerge_document::{ConfigDocument, DocumentError};

/// Errors from merge base stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stored merge base {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("invalid artifact name {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Durable record of the last merged document per configuration.
pub trait MergeBaseStore {
    /// Load the merge base, `None` if this configuration was never merged.
    fn get(&self, name: &str) -> Result<Option<ConfigDocument>, StoreError>;

    /// Replace the merge base.
    fn put(&mut self, name: &str, doc: &ConfigDocument) -> Result<(), StoreError>;

    /// Take exclusive access to `name` for a read-modify-write cycle.
    ///
    /// Stores without concurrent writers return `None`.
    fn lock(&self, _name: &str) -> Result<Option<ArtifactLock>, StoreError> {
        Ok(None)
    }

    /// Human-readable location of the stored document, for reports.
    fn location(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Reject names that could escape the store's namespace.
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
