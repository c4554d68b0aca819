//! In-memory merge base store, for dry runs and tests.

use std::collections::BTreeMap;

use flagmerge_document::ConfigDocument;

use super::{validate_name, MergeBaseStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: BTreeMap<String, ConfigDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl MergeBaseStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<ConfigDocument>, StoreError> {
        validate_name(name)?;
        Ok(self.documents.get(name).cloned())
    }

    fn put(&mut self, name: &str, doc: &ConfigDocument) -> Result<(), StoreError> {
        validate_name(name)?;
        self.documents.insert(name.to_string(), doc.clone());
        Ok(())
    }
}
