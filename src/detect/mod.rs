//! Change detection
//!
//! Decides whether a merged document needs a new hosted configuration
//! version, by comparing its content hash against the deployed state the
//! provisioning layer reports.

mod lifecycle;

pub use lifecycle::{ConfigLifecycle, ConfigState, LifecycleError};

use std::fs;
use std::path::Path;

use flagmerge_document::{ConfigDocument, ContentHash, DocumentError, SCHEMA_VERSION};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::engine::MergedDocument;

/// Last published version of a named configuration.
///
/// Owned by the remote configuration store; only ever read here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedState {
    /// Hosted configuration version number (None or 0: never published)
    #[serde(default, alias = "version")]
    pub version_number: Option<u64>,

    /// Content hash recorded when that version was published
    #[serde(default, alias = "hash")]
    pub content_hash: Option<String>,
}

impl DeployedState {
    pub fn new(version_number: Option<u64>, content_hash: Option<String>) -> Self {
        Self {
            version_number,
            content_hash,
        }
    }

    /// Whether a version has ever been published
    pub fn is_deployed(&self) -> bool {
        self.version_number.is_some_and(|v| v > 0)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Why a new version is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishReason {
    /// No deployed state was supplied
    NeverDeployed,
    /// Deployed state has no (or a zero) version number
    NoDeployedVersion,
    /// Deployed state carries no hash to compare against
    NoDeployedHash,
    /// Stored hash differs from the merged document
    ContentChanged,
}

impl PublishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverDeployed => "never_deployed",
            Self::NoDeployedVersion => "no_deployed_version",
            Self::NoDeployedHash => "no_deployed_hash",
            Self::ContentChanged => "content_changed",
        }
    }
}

/// Outcome of change detection.
///
/// Serializes as `{"decision": ..., "reason": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Publish(PublishReason),
    /// Deployed hash matches; publishing would create a redundant version
    Skip,
}

impl PublishDecision {
    pub fn is_publish(&self) -> bool {
        matches!(self, Self::Publish(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish(_) => "publish",
            Self::Skip => "skip",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Publish(reason) => reason.as_str(),
            Self::Skip => "unchanged",
        }
    }
}

impl Serialize for PublishDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PublishDecision", 2)?;
        state.serialize_field("decision", self.as_str())?;
        state.serialize_field("reason", self.reason())?;
        state.end()
    }
}

/// Compare a content hash with the deployed state.
pub fn decide(hash: &ContentHash, deployed: Option<&DeployedState>) -> PublishDecision {
    let Some(deployed) = deployed else {
        return PublishDecision::Publish(PublishReason::NeverDeployed);
    };
    if !deployed.is_deployed() {
        return PublishDecision::Publish(PublishReason::NoDeployedVersion);
    }
    match deployed.content_hash.as_deref() {
        None => PublishDecision::Publish(PublishReason::NoDeployedHash),
        Some(stored) if hash.matches(stored) => PublishDecision::Skip,
        Some(_) => PublishDecision::Publish(PublishReason::ContentChanged),
    }
}

/// Hash of a document as it would be stored after a merge.
///
/// Values must reference defined flags, and `version` is normalized to the
/// emitted schema version, so any input version hashes like its artifact.
pub fn merged_content_hash(doc: &ConfigDocument) -> Result<ContentHash, DocumentError> {
    doc.validate_references()?;
    if doc.version == SCHEMA_VERSION {
        return ContentHash::compute(doc);
    }
    let mut normalized = doc.clone();
    normalized.version = SCHEMA_VERSION.to_string();
    ContentHash::compute(&normalized)
}

/// True when `merged` must be published as a new version.
pub fn should_publish(merged: &MergedDocument, deployed: Option<&DeployedState>) -> bool {
    decide(&merged.content_hash, deployed).is_publish()
}
