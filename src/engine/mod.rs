//! Merge engine
//!
//! Overlays a locally edited flag document onto the previously merged
//! document for the same configuration:
//! - Flag definitions and value entries are merged key by key; local fields
//!   win, previously stored fields survive (objects merge recursively).
//! - Entries only present in the previous document are kept unless the
//!   [`DeletionPolicy`] removes them.
//! - Without a previous document the local document is taken as-is, but only
//!   when force-create was requested.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use flagmerge_document::{
    ConfigDocument, ContentHash, DocumentError, FlagDefinition, FlagValue, OpenMap,
    SCHEMA_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::deep_merge;

/// What happens to entries the local document no longer mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Additive-only: nothing is ever removed automatically
    #[default]
    Never,
    /// Entries carrying the removal marker set to `true` are removed
    Marker,
    /// The local document is authoritative for which keys exist
    Mirror,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Marker => "marker",
            Self::Mirror => "mirror",
        }
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "marker" => Ok(Self::Marker),
            "mirror" => Ok(Self::Mirror),
            other => Err(format!(
                "unknown deletion policy '{}' (valid: never, marker, mirror)",
                other
            )),
        }
    }
}

/// Where the merge started from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeBase {
    /// A previously merged artifact
    Artifact,
    /// No artifact; the local document was taken as authoritative
    ForceCreate,
}

/// Merge engine options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub deletion: DeletionPolicy,
    pub removal_marker: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            deletion: DeletionPolicy::Never,
            removal_marker: "_remove".to_string(),
        }
    }
}

/// The merge result together with its content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDocument {
    pub document: ConfigDocument,
    pub content_hash: ContentHash,
    pub base: MergeBase,
    /// Entries that existed in the merge base and were removed, as
    /// `flags.<name>` / `values.<name>`
    pub removed: Vec<String>,
    /// Marked entries with nothing to remove (absent from the merge base)
    pub dropped: Vec<String>,
}

/// Bookkeeping for entries taken out of a merge result
#[derive(Debug, Default)]
struct Removals {
    removed: Vec<String>,
    dropped: Vec<String>,
}

impl Removals {
    fn record(&mut self, section: &str, name: &str, existed: bool) {
        let entry = format!("{}.{}", section, name);
        if existed {
            self.removed.push(entry);
        } else {
            self.dropped.push(entry);
        }
    }
}

/// Merge failures
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no merge base exists for this configuration; rerun with --force-create to create it from the local document")]
    MissingBaseState,

    #[error("merged document is invalid: {0}")]
    Malformed(#[from] DocumentError),
}

/// Merges local flag documents onto their previous merge base.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    options: MergeOptions,
}

impl MergeEngine {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge `local` onto `previous`.
    ///
    /// Pure: neither input is modified and nothing is written. The result is
    /// validated and hashed before it is returned.
    pub fn merge(
        &self,
        local: &ConfigDocument,
        previous: Option<&ConfigDocument>,
        force_create: bool,
    ) -> Result<MergedDocument, MergeError> {
        let mut removals = Removals::default();
        let (mut document, base) = match previous {
            None if !force_create => return Err(MergeError::MissingBaseState),
            None => {
                debug!("no merge base, taking local document as authoritative");
                let flags = self.take_local(&local.flags, "flags", &mut removals, |f| &f.fields);
                let values =
                    self.take_local(&local.values, "values", &mut removals, |v| &v.metadata);
                let document = ConfigDocument {
                    flags,
                    values,
                    version: SCHEMA_VERSION.to_string(),
                };
                (document, MergeBase::ForceCreate)
            }
            Some(previous) => (
                self.overlay(local, previous, &mut removals),
                MergeBase::Artifact,
            ),
        };

        // A flag marked for removal takes its value with it.
        let orphaned: Vec<String> = document
            .values
            .keys()
            .filter(|name| {
                !document.flags.contains_key(*name)
                    && local
                        .flags
                        .get(*name)
                        .is_some_and(|flag| self.is_marked(&flag.fields))
            })
            .cloned()
            .collect();
        for name in orphaned {
            document.values.remove(&name);
            let existed = previous.is_some_and(|p| p.values.contains_key(&name));
            removals.record("values", &name, existed);
        }

        self.strip_markers(&mut document);

        document.validate()?;
        document.validate_references()?;
        let content_hash = ContentHash::compute(&document)?;

        debug!(
            flags = document.flag_count(),
            values = document.value_count(),
            removed = removals.removed.len(),
            dropped = removals.dropped.len(),
            hash = %content_hash,
            "merge complete"
        );

        Ok(MergedDocument {
            document,
            content_hash,
            base,
            removed: removals.removed,
            dropped: removals.dropped,
        })
    }

    /// Force-create path: copy local entries, dropping marked ones.
    fn take_local<T: Clone>(
        &self,
        local: &BTreeMap<String, T>,
        section: &str,
        removals: &mut Removals,
        fields: impl Fn(&T) -> &OpenMap,
    ) -> BTreeMap<String, T> {
        local
            .iter()
            .filter(|(name, entry)| {
                if self.is_marked(fields(entry)) {
                    debug!(section, name = name.as_str(), "dropping marked entry with no base");
                    removals.record(section, name, false);
                    false
                } else {
                    true
                }
            })
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    fn overlay(
        &self,
        local: &ConfigDocument,
        previous: &ConfigDocument,
        removals: &mut Removals,
    ) -> ConfigDocument {
        let flags = self.overlay_section(
            &previous.flags,
            &local.flags,
            "flags",
            removals,
            |f| &f.fields,
            merge_flag,
        );
        let values = self.overlay_section(
            &previous.values,
            &local.values,
            "values",
            removals,
            |v| &v.metadata,
            merge_value,
        );

        ConfigDocument {
            flags,
            values,
            version: SCHEMA_VERSION.to_string(),
        }
    }

    fn overlay_section<T: Clone>(
        &self,
        previous: &BTreeMap<String, T>,
        local: &BTreeMap<String, T>,
        section: &str,
        removals: &mut Removals,
        fields: impl Fn(&T) -> &OpenMap,
        merge_entry: impl Fn(T, &T) -> T,
    ) -> BTreeMap<String, T> {
        let mut merged = previous.clone();

        for (name, local_entry) in local {
            if self.is_marked(fields(local_entry)) {
                let existed = merged.remove(name).is_some();
                if existed {
                    debug!(section, name = name.as_str(), "removed by marker");
                }
                removals.record(section, name, existed);
                continue;
            }

            let entry = match merged.remove(name) {
                Some(stored) => merge_entry(stored, local_entry),
                None => {
                    debug!(section, name = name.as_str(), "new entry");
                    local_entry.clone()
                }
            };
            merged.insert(name.clone(), entry);
        }

        if self.options.deletion == DeletionPolicy::Mirror {
            merged.retain(|name, _| {
                let keep = local.contains_key(name);
                if !keep {
                    debug!(section, name = name.as_str(), "removed, absent from local document");
                    removals.record(section, name, true);
                }
                keep
            });
        }

        merged
    }

    fn is_marked(&self, fields: &OpenMap) -> bool {
        self.options.deletion == DeletionPolicy::Marker
            && fields.get(&self.options.removal_marker) == Some(&Value::Bool(true))
    }

    /// Under the marker policy the marker field itself is never persisted.
    fn strip_markers(&self, document: &mut ConfigDocument) {
        if self.options.deletion != DeletionPolicy::Marker {
            return;
        }
        let marker = &self.options.removal_marker;
        for flag in document.flags.values_mut() {
            flag.fields.remove(marker);
        }
        for value in document.values.values_mut() {
            value.metadata.remove(marker);
        }
    }
}

fn merge_flag(stored: FlagDefinition, local: &FlagDefinition) -> FlagDefinition {
    FlagDefinition {
        name: local.name.clone(),
        fields: overlay_fields(stored.fields, &local.fields),
    }
}

fn merge_value(stored: FlagValue, local: &FlagValue) -> FlagValue {
    FlagValue {
        enabled: local.enabled,
        metadata: overlay_fields(stored.metadata, &local.metadata),
    }
}

fn overlay_fields(mut stored: OpenMap, local: &OpenMap) -> OpenMap {
    for (key, local_value) in local {
        let merged = match stored.remove(key) {
            Some(stored_value) => deep_merge(stored_value, local_value.clone()),
            None => local_value.clone(),
        };
        stored.insert(key.clone(), merged);
    }
    stored
}
