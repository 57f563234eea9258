//! # Filesystem Store Backend
//!
//! ## Purpose
//! Maps a bucket onto a directory tree: object keys become relative file
//! paths under the bucket root. Used for local deployments and operational
//! tooling against a synced corpus snapshot.

use super::{validate_key, ObjectStore};
use crate::errors::{Result, SyncError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Object store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FsObjectStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::StoreUnavailable {
                operation: format!("get {}", key),
                details: e.to_string(),
            }),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries =
                tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|e| SyncError::StoreUnavailable {
                        operation: format!("list {}", dir.display()),
                        details: e.to_string(),
                    })?;
            while let Some(entry) =
                entries
                    .next_entry()
                    .await
                    .map_err(|e| SyncError::StoreUnavailable {
                        operation: format!("list {}", dir.display()),
                        details: e.to_string(),
                    })?
            {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        debug!(prefix = prefix, count = keys.len(), "listed fs objects");
        Ok(keys)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::StoreUnavailable {
                    operation: format!("put {}", key),
                    details: e.to_string(),
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| SyncError::StoreUnavailable {
                operation: format!("put {}", key),
                details: e.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::StoreUnavailable {
                operation: format!("delete {}", key),
                details: e.to_string(),
            }),
        }
    }
}
