//! Configuration document model
//!
//! A document is the AppConfig feature flag payload:
//!
//! ```json
//! {
//!   "flags":  { "f1": { "name": "f1", "attributes": { ... } } },
//!   "values": { "f1": { "enabled": true, "extra": "..." } },
//!   "version": "1"
//! }
//! ```
//!
//! Flag definitions and value entries carry open mappings so that fields the
//! tool does not know about pass through untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DocumentError;
use crate::SCHEMA_VERSION;

/// Open string-keyed mapping of arbitrary JSON values.
pub type OpenMap = BTreeMap<String, Value>;

/// A feature flag definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    /// Display name of the flag
    pub name: String,

    /// Every other field (`attributes`, `description`, `_deprecation`, ...)
    #[serde(flatten)]
    pub fields: OpenMap,
}

impl FlagDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: OpenMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// The `attributes` object, if present.
    pub fn attributes(&self) -> Option<&serde_json::Map<String, Value>> {
        self.fields.get("attributes").and_then(Value::as_object)
    }
}

/// A flag value entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagValue {
    pub enabled: bool,

    /// Additional metadata (attribute values, variant data, ...)
    #[serde(flatten)]
    pub metadata: OpenMap,
}

impl FlagValue {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            metadata: OpenMap::new(),
        }
    }

    /// Builder-style metadata setter
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A feature flag configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(deserialize_with = "unique_map")]
    pub flags: BTreeMap<String, FlagDefinition>,

    #[serde(deserialize_with = "unique_map")]
    pub values: BTreeMap<String, FlagValue>,

    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            flags: BTreeMap::new(),
            values: BTreeMap::new(),
            version: default_version(),
        }
    }
}

impl ConfigDocument {
    /// Parse and validate a document from JSON text.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Self::from_slice(json.as_bytes())
    }

    /// Parse and validate a document from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Load and validate a document from a file.
    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Serialize to JSON (pretty printed, keys sorted)
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check per-entry structure.
    ///
    /// Value entries are allowed to reference flags defined elsewhere, since
    /// a local edit may only touch values; see [`Self::validate_references`].
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (key, flag) in &self.flags {
            if key.trim().is_empty() {
                return Err(DocumentError::Schema("flag key must not be empty".to_string()));
            }
            if flag.name.trim().is_empty() {
                return Err(DocumentError::Schema(format!(
                    "flag `{}` has an empty name",
                    key
                )));
            }
            if let Some(attributes) = flag.fields.get("attributes") {
                if !attributes.is_object() {
                    return Err(DocumentError::Schema(format!(
                        "flag `{}`: attributes must be an object",
                        key
                    )));
                }
            }
        }

        if let Some(key) = self.values.keys().find(|k| k.trim().is_empty()) {
            return Err(DocumentError::Schema(format!(
                "value key must not be empty (got {:?})",
                key
            )));
        }

        Ok(())
    }

    /// Every value entry must belong to a defined flag.
    pub fn validate_references(&self) -> Result<(), DocumentError> {
        let orphans: Vec<&str> = self
            .values
            .keys()
            .filter(|name| !self.flags.contains_key(*name))
            .map(String::as_str)
            .collect();

        if orphans.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::Schema(format!(
                "values without a flag definition: {}",
                orphans.join(", ")
            )))
        }
    }

    /// Number of flag definitions
    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    /// Number of value entries
    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

/// Deserialize a name-keyed map, rejecting repeated keys.
///
/// serde_json keeps the last occurrence of a repeated key, which would let
/// two definitions of the same flag silently shadow each other.
fn unique_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueMapVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueMapVisitor<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object keyed by unique names")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut map = BTreeMap::new();
            while let Some(key) = access.next_key::<String>()? {
                if map.contains_key(&key) {
                    return Err(de::Error::custom(format_args!("duplicate key `{}`", key)));
                }
                let value = access.next_value()?;
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueMapVisitor(PhantomData))
}
