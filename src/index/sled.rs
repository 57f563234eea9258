//! # Embedded Index Backend
//!
//! ## Purpose
//! Search index persisted in an embedded sled database: one tree of
//! bincode-serialized records keyed by document id, optionally gzip
//! compressed. Serves local deployments where the search engine reads the
//! same database.

use super::SearchIndex;
use crate::config::IndexConfig;
use crate::errors::{Result, SyncError};
use crate::model::LegalDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One indexed record as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    document: LegalDocument,
    indexed_at: DateTime<Utc>,
}

/// Search index backed by an embedded sled database.
pub struct SledSearchIndex {
    db: Arc<::sled::Db>,
    documents: Arc<::sled::Tree>,
    compression_enabled: bool,
}

impl SledSearchIndex {
    /// Opens (or creates) the index database described by `config`.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let db = ::sled::Config::new()
            .path(&config.path)
            .cache_capacity(config.cache_capacity_mb * 1024 * 1024)
            .open()
            .map_err(|e| SyncError::Index {
                operation: "open database".to_string(),
                details: format!("{}: {}", config.path.display(), e),
            })?;

        let documents = db.open_tree("documents").map_err(|e| SyncError::Index {
            operation: "open documents tree".to_string(),
            details: e.to_string(),
        })?;

        info!(
            path = %config.path.display(),
            documents = documents.len(),
            "search index opened"
        );

        Ok(SledSearchIndex {
            db: Arc::new(db),
            documents: Arc::new(documents),
            compression_enabled: config.compression_enabled,
        })
    }

    /// Reads one record back, mainly for operational tooling and tests.
    pub fn get(&self, id: &str) -> Result<Option<LegalDocument>> {
        match self.documents.get(id.as_bytes()).map_err(|e| SyncError::Index {
            operation: format!("get {}", id),
            details: e.to_string(),
        })? {
            Some(value) => Ok(Some(self.decode(&value)?.document)),
            None => Ok(None),
        }
    }

    /// Verifies the database accepts writes and reads them back.
    pub async fn health_check(&self) -> Result<()> {
        let test_key = b"__health_check";
        self.documents
            .insert(test_key, b"ok")
            .map_err(|e| SyncError::Index {
                operation: "health check write".to_string(),
                details: e.to_string(),
            })?;

        let read_back = self
            .documents
            .get(test_key)
            .map_err(|e| SyncError::Index {
                operation: "health check read".to_string(),
                details: e.to_string(),
            })?;
        if read_back.is_none() {
            return Err(SyncError::Index {
                operation: "health check read".to_string(),
                details: "written value not found".to_string(),
            });
        }

        self.documents
            .remove(test_key)
            .map_err(|e| SyncError::Index {
                operation: "health check cleanup".to_string(),
                details: e.to_string(),
            })?;
        Ok(())
    }

    fn encode(&self, record: &StoredRecord) -> Result<Vec<u8>> {
        let serialized = bincode::serialize(record)?;
        if self.compression_enabled {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&serialized).map_err(|e| SyncError::Index {
                operation: "compress record".to_string(),
                details: e.to_string(),
            })?;
            encoder.finish().map_err(|e| SyncError::Index {
                operation: "compress record".to_string(),
                details: e.to_string(),
            })
        } else {
            Ok(serialized)
        }
    }

    fn decode(&self, data: &[u8]) -> Result<StoredRecord> {
        let serialized = if self.compression_enabled {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut buffer = Vec::new();
            decoder
                .read_to_end(&mut buffer)
                .map_err(|e| SyncError::Index {
                    operation: "decompress record".to_string(),
                    details: e.to_string(),
                })?;
            buffer
        } else {
            data.to_vec()
        };
        Ok(bincode::deserialize(&serialized)?)
    }

    /// Forces pending writes to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| SyncError::Index {
                operation: "flush".to_string(),
                details: e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for SledSearchIndex {
    async fn upsert(&self, id: &str, document: &LegalDocument) -> Result<()> {
        let record = StoredRecord {
            id: id.to_string(),
            document: document.clone(),
            indexed_at: Utc::now(),
        };
        let value = self.encode(&record)?;
        self.documents
            .insert(id.as_bytes(), value)
            .map_err(|e| SyncError::Index {
                operation: format!("upsert {}", id),
                details: e.to_string(),
            })?;
        debug!(id = id, "indexed document");
        Ok(())
    }

    async fn bulk_upsert(&self, entries: &[(String, LegalDocument)]) -> Result<usize> {
        for (id, document) in entries {
            self.upsert(id, document).await?;
        }
        self.flush().await?;
        Ok(entries.len())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let previous = self
            .documents
            .remove(id.as_bytes())
            .map_err(|e| SyncError::Index {
                operation: format!("delete {}", id),
                details: e.to_string(),
            })?;
        Ok(previous.is_some())
    }

    async fn delete_by_indexed_at_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut stale = Vec::new();
        for entry in self.documents.iter() {
            let (key, value) = entry.map_err(|e| SyncError::Index {
                operation: "scan documents".to_string(),
                details: e.to_string(),
            })?;
            let record = self.decode(&value)?;
            if record.indexed_at < cutoff {
                stale.push(key);
            }
        }

        for key in &stale {
            self.documents.remove(key).map_err(|e| SyncError::Index {
                operation: "delete stale document".to_string(),
                details: e.to_string(),
            })?;
        }
        self.flush().await?;

        if !stale.is_empty() {
            info!(removed = stale.len(), "removed stale index records");
        }
        Ok(stale.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }
}
