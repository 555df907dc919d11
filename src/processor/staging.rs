//! Inbox staging
//!
//! Lists the inbox (or takes an explicit key list), downloads each object into
//! the run's working directory and tags it with its source.

use crate::error::Result;
use crate::models::{FileSource, StagedFile, file_name_of};
use crate::store::ObjectStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Pulls inbox objects into local working storage
#[derive(Debug, Clone)]
pub struct Staging {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    inbox: String,
    external_patterns: Vec<glob::Pattern>,
}

impl Staging {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        inbox: impl Into<String>,
        external_patterns: Vec<glob::Pattern>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            inbox: inbox.into(),
            external_patterns,
        }
    }

    /// Source classification by file name
    pub fn classify(&self, file_name: &str) -> FileSource {
        if self
            .external_patterns
            .iter()
            .any(|pattern| pattern.matches(file_name))
        {
            FileSource::External
        } else {
            FileSource::Email
        }
    }

    /// Keys to process: the given list, or everything in the inbox
    pub fn pending_keys(&self, requested: &[String]) -> Result<Vec<String>> {
        if !requested.is_empty() {
            return Ok(requested.to_vec());
        }
        let keys = self.store.list(&self.bucket, &self.inbox)?;
        debug!("Found {} objects under {}", keys.len(), self.inbox);
        Ok(keys)
    }

    /// Download objects into `work_dir`.
    ///
    /// Objects that cannot be downloaded are logged and skipped; they were
    /// most likely already processed by an earlier run.
    pub fn stage(&self, keys: &[String], work_dir: &Path) -> Result<Vec<StagedFile>> {
        let mut staged = Vec::with_capacity(keys.len());
        let mut seen = HashSet::new();

        for key in keys {
            let file_name = file_name_of(key);
            if file_name.is_empty() {
                debug!("Skipping directory marker {}", key);
                continue;
            }
            if !seen.insert(file_name.to_string()) {
                warn!(target: "execution", "Skipping {}: duplicate file name in this run", key);
                continue;
            }

            let body = match self.store.get(&self.bucket, key) {
                Ok(body) => body,
                Err(e) => {
                    error!(
                        target: "execution",
                        "Downloading {} failed. File potentially already processed: {}",
                        key,
                        e
                    );
                    continue;
                }
            };

            let local_path = work_dir.join(file_name);
            std::fs::write(&local_path, body)?;
            staged.push(StagedFile::new(local_path, key.clone(), self.classify(file_name)));
        }

        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsObjectStore;
    use tempfile::TempDir;

    fn staging(store_dir: &TempDir, patterns: &[&str]) -> (Arc<dyn ObjectStore>, Staging) {
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(store_dir.path()));
        let patterns = patterns
            .iter()
            .map(|p| glob::Pattern::new(p).unwrap())
            .collect();
        let staging = Staging::new(Arc::clone(&store), "ingest", "newTBP/", patterns);
        (store, staging)
    }

    #[test]
    fn test_stages_inbox_in_key_order() {
        let store_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let (store, staging) = staging(&store_dir, &["*_ftp_*"]);
        store.put("ingest", "newTBP/b_ftp_1.csv", b"b").unwrap();
        store.put("ingest", "newTBP/a.csv", b"a").unwrap();
        store.put("ingest", "newP/done.csv", b"x").unwrap();

        let keys = staging.pending_keys(&[]).unwrap();
        let files = staging.stage(&keys, work_dir.path()).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name(), "a.csv");
        assert_eq!(files[0].source, FileSource::Email);
        assert_eq!(files[1].source, FileSource::External);
        assert_eq!(std::fs::read(&files[1].local_path).unwrap(), b"b");
    }

    #[test]
    fn test_missing_objects_are_skipped() {
        let store_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let (store, staging) = staging(&store_dir, &[]);
        store.put("ingest", "newTBP/present.csv", b"p").unwrap();

        let keys = vec![
            "newTBP/gone.csv".to_string(),
            "newTBP/present.csv".to_string(),
        ];
        let files = staging.stage(&keys, work_dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].origin_key, "newTBP/present.csv");
    }

    #[test]
    fn test_requested_keys_override_listing() {
        let store_dir = TempDir::new().unwrap();
        let (store, staging) = staging(&store_dir, &[]);
        store.put("ingest", "newTBP/a.csv", b"a").unwrap();

        let requested = vec!["newTBP/z.csv".to_string()];
        assert_eq!(staging.pending_keys(&requested).unwrap(), requested);
    }
}
