//! flagmerge - feature flag merge and change detection
//!
//! Merges locally edited AppConfig feature flag documents with the last
//! merged state and decides whether a new hosted configuration version has
//! to be published.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod store;

pub use config::{EffectiveConfig, Settings};
pub use detect::{decide, merged_content_hash, should_publish, DeployedState, PublishDecision, PublishReason};
pub use engine::{DeletionPolicy, MergeEngine, MergeError, MergeOptions, MergedDocument};
pub use error::{ErrorKind, PipelineError};
pub use flagmerge_document::{ConfigDocument, ContentHash, FlagDefinition, FlagValue};
pub use pipeline::{BatchRequest, ConfigTarget, MergeRequest, Pipeline};
pub use report::{BatchSummary, MergeReport};
pub use store::{FileStore, MemoryStore, MergeBaseStore};
