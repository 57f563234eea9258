//! # Object Store Module
//!
//! ## Purpose
//! Abstraction over the object store holding the authoritative XML corpus,
//! changelog files, and sync status objects. One store instance corresponds
//! to one logical bucket; keys are `/`-separated paths within it.
//!
//! ## Supported Backends
//! - **fs**: A directory tree on the local filesystem
//! - **http**: A remote bucket gateway speaking plain GET/PUT/DELETE
//! - **memory**: In-process map for tests
//!
//! ## Contract
//! - `get` returns `Ok(None)` for missing keys; transport problems are
//!   errors
//! - `list_keys` returns keys ascending, so changelog listings arrive in
//!   embedded-timestamp order as a side effect of the naming scheme
//! - Writes are limited to small status objects (checkpoint, lock); the
//!   corpus itself is written by upstream publishers

pub mod fs;
pub mod http;
pub mod memory;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

use crate::errors::{Result, SyncError};
use async_trait::async_trait;

/// Read/write access to a single object-store bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches an object. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetches an object and decodes it as UTF-8.
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| SyncError::Serialization {
                    message: format!("object '{}' is not valid UTF-8: {}", key, e),
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    /// Lists all keys starting with `prefix`, ascending. An empty prefix
    /// lists the whole bucket.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Writes an object, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Rejects keys that could escape the bucket or are plainly malformed.
/// Changelog contents are external input, so keys are validated before any
/// backend touches them.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SyncError::ValidationFailed {
            field: "key".to_string(),
            reason: "empty object key".to_string(),
        });
    }
    if key.starts_with('/') || key.split('/').any(|part| part.is_empty() || part == "..") {
        return Err(SyncError::ValidationFailed {
            field: "key".to_string(),
            reason: format!("object key '{}' is not a clean relative path", key),
        });
    }
    Ok(())
}
