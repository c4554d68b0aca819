//! Canonical content hash
//!
//! content_hash = SHA-256 hex digest of JCS({flags, values, version})
//!
//! JCS (RFC 8785) sorts object keys and fixes number formatting, so the hash
//! does not depend on the key order of the source file.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::document::{ConfigDocument, FlagDefinition, FlagValue};
use crate::error::DocumentError;

/// Hex length of a SHA-256 digest
const HASH_HEX_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of a document's canonical form.
///
/// Only built by [`ContentHash::compute`] or the validating
/// [`ContentHash::from_hex`]; serializes as the bare hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

/// The exact fields covered by the hash.
#[derive(Serialize)]
struct HashInput<'a> {
    flags: &'a BTreeMap<String, FlagDefinition>,
    values: &'a BTreeMap<String, FlagValue>,
    version: &'a str,
}

impl ContentHash {
    /// Compute the content hash of a document.
    pub fn compute(doc: &ConfigDocument) -> Result<Self, DocumentError> {
        let input = HashInput {
            flags: &doc.flags,
            values: &doc.values,
            version: &doc.version,
        };

        let jcs_bytes = serde_json_canonicalizer::to_vec(&input)
            .map_err(|e| DocumentError::Jcs(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Parse a hash recorded elsewhere (e.g. by the provisioning layer).
    ///
    /// Accepts upper or lower case hex and normalizes to lower case.
    pub fn from_hex(s: &str) -> Result<Self, DocumentError> {
        let trimmed = s.trim();
        if trimmed.len() != HASH_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DocumentError::Schema(format!(
                "content hash must be {} hex characters, got {:?}",
                HASH_HEX_LEN, s
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a stored hash string, ignoring case and whitespace.
    pub fn matches(&self, stored: &str) -> bool {
        self.0.eq_ignore_ascii_case(stored.trim())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
