//! Pipeline errors and their exit codes.

use std::io;
use std::path::PathBuf;

use flagmerge_document::DocumentError;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::detect::LifecycleError;
use crate::engine::MergeError;
use crate::store::StoreError;

/// Coarse classification used for exit codes and batch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No merge base and force-create was not given
    MissingBaseState,
    /// Source, artifact or deployed state is not a valid document
    MalformedDocument,
    /// Filesystem failure; retryable
    Io,
    /// Bad tool configuration or arguments
    Config,
    /// Broken internal invariant
    Internal,
}

impl ErrorKind {
    /// Process exit code for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingBaseState => 2,
            Self::MalformedDocument => 3,
            Self::Io => 4,
            Self::Config | Self::Internal => 1,
        }
    }
}

/// Failure while processing one configuration
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read source {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source {path} is malformed: {source}")]
    MalformedSource {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("deployed state {path} could not be loaded: {source}")]
    DeployedState {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("failed to write report {path}: {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadSource { .. } | Self::WriteReport { .. } | Self::Walk { .. } => {
                ErrorKind::Io
            }
            Self::MalformedSource { .. } => ErrorKind::MalformedDocument,
            Self::DeployedState { source, .. } if source.is_io() => ErrorKind::Io,
            Self::DeployedState { .. } => ErrorKind::MalformedDocument,
            Self::Merge(MergeError::MissingBaseState) => ErrorKind::MissingBaseState,
            Self::Merge(MergeError::Malformed(_)) => ErrorKind::MalformedDocument,
            Self::Store(StoreError::Malformed { .. }) => ErrorKind::MalformedDocument,
            Self::Store(StoreError::Io { .. } | StoreError::Lock(_)) => ErrorKind::Io,
            Self::Store(StoreError::InvalidName(_)) | Self::Config(_) => ErrorKind::Config,
            Self::Lifecycle(_) | Self::Serialize(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
