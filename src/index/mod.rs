//! # Search Index Module
//!
//! ## Purpose
//! Abstraction over the search index the sync job writes into. The index
//! stores one flattened record per document id and stamps every write with
//! an ingestion instant, which the full-reindex path uses to sweep out
//! records its walk did not touch.
//!
//! ## Contract
//! - Upserts replace the record for an id wholesale, so re-applying a
//!   changelog is idempotent
//! - `delete_by_indexed_at_before` removes every record last written before
//!   the cutoff and reports how many went away
//! - Ranking, analysis, and query execution are the search engine's
//!   business, not modeled here

pub mod memory;
pub mod sled;

pub use self::memory::MemorySearchIndex;
pub use self::sled::SledSearchIndex;

use crate::errors::Result;
use crate::model::LegalDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Write access to the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Inserts or replaces one document under `id`.
    async fn upsert(&self, id: &str, document: &LegalDocument) -> Result<()>;

    /// Inserts or replaces a batch, returning how many were written.
    async fn bulk_upsert(&self, entries: &[(String, LegalDocument)]) -> Result<usize>;

    /// Removes one document. Returns whether it existed.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    /// Removes every document whose last write happened before `cutoff`.
    /// Returns how many were removed.
    async fn delete_by_indexed_at_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Number of documents currently indexed.
    async fn count(&self) -> Result<usize>;
}
