//! Run reports
//!
//! `merge_report` is what the provisioning layer reads: where the merged
//! document was written, its content hash, and whether to publish it.

use chrono::{DateTime, Utc};
use flagmerge_document::ContentHash;
use serde::Serialize;

use crate::detect::{ConfigState, PublishDecision};
use crate::engine::{DeletionPolicy, MergeBase};
use crate::error::ErrorKind;

/// Schema version for reports
pub const SCHEMA_VERSION: u32 = 1;

pub const MERGE_REPORT_SCHEMA_ID: &str = "flagmerge/merge_report@1";
pub const BATCH_SUMMARY_SCHEMA_ID: &str = "flagmerge/batch_summary@1";

/// Result of processing one configuration
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,

    pub configuration: String,
    pub environment: String,
    pub profile: String,

    /// Source feature flag file
    pub source: String,

    /// Where the merged document was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,

    pub content_hash: ContentHash,
    pub base: MergeBase,

    /// `decision` and `reason`
    #[serde(flatten)]
    pub decision: PublishDecision,

    pub previous_state: ConfigState,
    pub state: ConfigState,

    pub flag_count: usize,
    pub value_count: usize,
    pub deletion_policy: DeletionPolicy,
    pub removed: Vec<String>,

    /// Entries marked for removal that were not in the merge base
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<String>,
}

impl MergeReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A configuration that failed in a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// One configuration in a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub configuration: String,
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<MergeReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchFailure>,
}

/// Summary of a batch run over a directory
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub directory: String,
    pub total: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    pub fn new(run_id: &str, directory: String, entries: Vec<BatchEntry>) -> Self {
        let published = entries
            .iter()
            .filter(|e| e.report.as_ref().is_some_and(|r| r.decision.is_publish()))
            .count();
        let failed = entries.iter().filter(|e| e.error.is_some()).count();

        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: BATCH_SUMMARY_SCHEMA_ID.to_string(),
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            directory,
            total: entries.len(),
            published,
            skipped: entries.len() - published - failed,
            failed,
            entries,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
