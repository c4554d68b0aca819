//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Merge artifact suffix: `flags.json` -> `flags.merged.json`
    pub artifact_suffix: String,

    /// Seconds to wait for another writer to release an artifact
    pub lock_timeout_seconds: u64,

    /// Deletion policy (default: "never", additive-only)
    pub deletion_policy: String,

    /// Field that marks an entry for removal under the "marker" policy
    pub removal_marker: String,

    /// Batch mode include globs, relative to the batch directory
    pub batch_include: Vec<String>,

    /// Batch mode exclude globs
    pub batch_exclude: Vec<String>,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            artifact_suffix: "merged".to_string(),
            lock_timeout_seconds: 30,
            deletion_policy: "never".to_string(),
            removal_marker: "_remove".to_string(),
            batch_include: vec!["**/*.json".to_string()],
            batch_exclude: Vec::new(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "artifact_suffix": self.artifact_suffix,
            "lock_timeout_seconds": self.lock_timeout_seconds,
            "deletion": {
                "policy": self.deletion_policy,
                "marker": self.removal_marker
            },
            "batch": {
                "include": self.batch_include,
                "exclude": self.batch_exclude
            }
        })
    }
}
