//! # In-Memory Index Backend
//!
//! ## Purpose
//! Search index held in a process-local map, used by tests to observe
//! exactly what a sync run wrote without an embedded database on disk.

use super::SearchIndex;
use crate::errors::Result;
use crate::model::LegalDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    document: LegalDocument,
    indexed_at: DateTime<Utc>,
}

/// Search index over an in-process ordered map.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        MemorySearchIndex::default()
    }

    pub async fn get(&self, id: &str) -> Option<LegalDocument> {
        self.entries.read().await.get(id).map(|e| e.document.clone())
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, id: &str, document: &LegalDocument) -> Result<()> {
        self.entries.write().await.insert(
            id.to_string(),
            Entry {
                document: document.clone(),
                indexed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn bulk_upsert(&self, entries: &[(String, LegalDocument)]) -> Result<usize> {
        for (id, document) in entries {
            self.upsert(id, document).await?;
        }
        Ok(entries.len())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn delete_by_indexed_at_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.indexed_at >= cutoff);
        Ok(before - entries.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
