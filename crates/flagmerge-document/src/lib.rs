//! Feature flag document types
//!
//! Defines the AppConfig feature flag configuration document (`flags`,
//! `values`, `version`) and its canonical content hash.

pub mod document;
pub mod error;
pub mod hash;

pub use document::{ConfigDocument, FlagDefinition, FlagValue, OpenMap};
pub use error::DocumentError;
pub use hash::ContentHash;

/// Schema version marker carried by every emitted document.
pub const SCHEMA_VERSION: &str = "1";
