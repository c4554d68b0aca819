//! Sibling-file merge base store
//!
//! For a source `<dir>/<stem>.json` the merge artifact lives at
//! `<dir>/<stem>.<suffix>.json`, so later runs find it without any external
//! bookkeeping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flagmerge_document::ConfigDocument;
use tracing::debug;

use super::lock::ArtifactLock;
use super::{validate_name, MergeBaseStore, StoreError};

/// Artifact path for a source file.
pub fn artifact_path_for(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    source.with_file_name(format!("{}.{}.json", stem, suffix))
}

/// True if `path` is itself a merge artifact (or one of its lock/temp files).
pub fn is_artifact_path(path: &Path, suffix: &str) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    let marker = format!(".{}.json", suffix);
    name.ends_with(&marker)
        || name.ends_with(&format!("{}.lock", marker))
        || name.ends_with(&format!("{}.tmp", marker))
}

/// Stores merge bases as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    suffix: String,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>, lock_timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
            lock_timeout,
        }
    }

    /// Store rooted next to `source`, keyed by its file stem.
    ///
    /// Returns the store and the key to use for `source`.
    pub fn beside(
        source: &Path,
        suffix: impl Into<String>,
        lock_timeout: Duration,
    ) -> Result<(Self, String), StoreError> {
        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        validate_name(&name)?;

        let dir = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok((Self::new(dir, suffix, lock_timeout), name))
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.json", name, self.suffix))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.json.lock", name, self.suffix))
    }

    fn io_error(path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl MergeBaseStore for FileStore {
    fn get(&self, name: &str) -> Result<Option<ConfigDocument>, StoreError> {
        validate_name(name)?;
        let path = self.artifact_path(name);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no merge artifact");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(&path, e)),
        };

        let doc = ConfigDocument::from_slice(&bytes)
            .map_err(|source| StoreError::Malformed { path: path.clone(), source })?;
        debug!(path = %path.display(), flags = doc.flag_count(), "loaded merge artifact");
        Ok(Some(doc))
    }

    /// Write atomically (write-then-rename)
    fn put(&mut self, name: &str, doc: &ConfigDocument) -> Result<(), StoreError> {
        validate_name(name)?;
        let path = self.artifact_path(name);

        let json = doc.to_json().map_err(|e| StoreError::Malformed {
            path: path.clone(),
            source: e.into(),
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let temp_path = self.dir.join(format!("{}.{}.json.tmp", name, self.suffix));
        fs::write(&temp_path, json).map_err(|e| Self::io_error(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Self::io_error(&path, e)
        })?;

        debug!(path = %path.display(), "wrote merge artifact");
        Ok(())
    }

    fn lock(&self, name: &str) -> Result<Option<ArtifactLock>, StoreError> {
        validate_name(name)?;
        Ok(Some(ArtifactLock::acquire(&self.lock_path(name), self.lock_timeout)?))
    }

    fn location(&self, name: &str) -> Option<PathBuf> {
        Some(self.artifact_path(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagmerge_document::{FlagDefinition, FlagValue};
    use tempfile::TempDir;

    fn sample() -> ConfigDocument {
        let mut doc = ConfigDocument::default();
        doc.flags.insert("f1".to_string(), FlagDefinition::new("f1"));
        doc.values.insert("f1".to_string(), FlagValue::new(true));
        doc
    }

    #[test]
    fn test_artifact_path_for() {
        assert_eq!(
            artifact_path_for(Path::new("flags/checkout.json"), "merged"),
            PathBuf::from("flags/checkout.merged.json")
        );
        assert_eq!(
            artifact_path_for(Path::new("checkout"), "merged"),
            PathBuf::from("checkout.merged.json")
        );
    }

    #[test]
    fn test_is_artifact_path() {
        assert!(is_artifact_path(Path::new("a/x.merged.json"), "merged"));
        assert!(is_artifact_path(Path::new("x.merged.json.lock"), "merged"));
        assert!(is_artifact_path(Path::new("x.merged.json.tmp"), "merged"));
        assert!(!is_artifact_path(Path::new("x.json"), "merged"));
        assert!(!is_artifact_path(Path::new("merged.json"), "merged"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), "merged", Duration::from_secs(1));
        assert!(store.get("flags").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path(), "merged", Duration::from_secs(1));

        store.put("flags", &sample()).unwrap();

        assert!(dir.path().join("flags.merged.json").exists());
        assert!(!dir.path().join("flags.merged.json.tmp").exists());
        assert_eq!(store.get("flags").unwrap(), Some(sample()));
    }

    #[test]
    fn test_malformed_artifact() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("flags.merged.json"), r#"{"flags": {}}"#).unwrap();
        let store = FileStore::new(dir.path(), "merged", Duration::from_secs(1));

        assert!(matches!(store.get("flags"), Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn test_beside_source() {
        let (store, name) =
            FileStore::beside(Path::new("config/checkout.json"), "merged", Duration::from_secs(1))
                .unwrap();
        assert_eq!(name, "checkout");
        assert_eq!(
            store.artifact_path(&name),
            PathBuf::from("config/checkout.merged.json")
        );

        let (bare, _) =
            FileStore::beside(Path::new("checkout.json"), "merged", Duration::from_secs(1)).unwrap();
        assert_eq!(bare.artifact_path("checkout"), PathBuf::from("./checkout.merged.json"));
    }

    #[test]
    fn test_lock_is_per_artifact() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), "merged", Duration::from_secs(1));

        let a = store.lock("a").unwrap().unwrap();
        let b = store.lock("b").unwrap().unwrap();
        assert_ne!(a.path(), b.path());
    }
}
