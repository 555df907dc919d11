//! Object store abstraction.
//!
//! The ingester reads its inbox and mapping table from, and writes records,
//! routed files and metrics to, a bucket/key object store. [`FsObjectStore`]
//! backs it with a local directory tree (one sub-directory per bucket).

use crate::error::{IngestError, Result};
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Minimal blob-store operations used by the ingester
pub trait ObjectStore: Debug + Send + Sync {
    /// Read an object's bytes
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object
    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()>;

    /// Copy an object within a bucket
    fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> Result<()>;

    /// Delete an object
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Keys under a prefix, in lexicographic order
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// Filesystem-backed object store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of an object
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_segment("bucket", bucket)?;
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
            return Err(IngestError::configuration(format!(
                "Invalid object key '{}'",
                key
            )));
        }
        Ok(self.root.join(bucket).join(key))
    }

    fn not_found(bucket: &str, key: &str) -> IngestError {
        IngestError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value == ".." {
        return Err(IngestError::configuration(format!(
            "Invalid {} name '{}'",
            kind, value
        )));
    }
    Ok(())
}

impl ObjectStore for FsObjectStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Self::not_found(bucket, key),
            _ => IngestError::Io(e),
        })
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, body)?;
        debug!("Wrote {} bytes to {}/{}", body.len(), bucket, key);
        Ok(())
    }

    fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> Result<()> {
        let body = self.get(bucket, from_key)?;
        self.put(bucket, to_key, &body)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Self::not_found(bucket, key),
            _ => IngestError::Io(e),
        })
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        validate_segment("bucket", bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&bucket_dir) {
            let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        store.put("bucket", "a/b/c.csv", b"hello").unwrap();
        assert_eq!(store.get("bucket", "a/b/c.csv").unwrap(), b"hello");
        assert!(temp_dir.path().join("bucket/a/b/c.csv").exists());
    }

    #[test]
    fn test_missing_object() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        match store.get("bucket", "missing.json").unwrap_err() {
            IngestError::ObjectNotFound { bucket, key } => {
                assert_eq!(bucket, "bucket");
                assert_eq!(key, "missing.json");
            }
            other => panic!("Expected ObjectNotFound, got {:?}", other),
        }
        assert!(matches!(
            store.delete("bucket", "missing.json"),
            Err(IngestError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_copy_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        store.put("bucket", "newTBP/file.csv", b"data").unwrap();
        store.copy("bucket", "newTBP/file.csv", "newP/file.csv").unwrap();
        store.delete("bucket", "newTBP/file.csv").unwrap();

        assert_eq!(store.get("bucket", "newP/file.csv").unwrap(), b"data");
        assert!(store.get("bucket", "newTBP/file.csv").is_err());
    }

    #[test]
    fn test_list_is_sorted_and_prefix_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        store.put("bucket", "newTBP/b.csv", b"").unwrap();
        store.put("bucket", "newTBP/a.csv", b"").unwrap();
        store.put("bucket", "newP/c.csv", b"").unwrap();

        assert_eq!(
            store.list("bucket", "newTBP/").unwrap(),
            vec!["newTBP/a.csv".to_string(), "newTBP/b.csv".to_string()]
        );
        assert_eq!(store.list("bucket", "").unwrap().len(), 3);
        assert!(store.list("empty", "").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(temp_dir.path());

        assert!(store.put("bucket", "../outside.csv", b"").is_err());
        assert!(store.put("bucket", "/abs.csv", b"").is_err());
        assert!(store.put("../bucket", "key.csv", b"").is_err());
    }
}
