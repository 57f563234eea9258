//! # Legal Index Sync
//!
//! Incremental search-index synchronization for hierarchical legal XML
//! documents (LegalDocML.de). The crate keeps a search index in step with an
//! object store that holds the authoritative XML corpus, using an append-only
//! changelog protocol so that routine runs touch only the documents that
//! actually changed.
//!
//! ## Architecture Overview
//!
//! The system is composed of several interconnected modules:
//!
//! - **xml**: Namespace-aware XML access layer with a small query language
//!   and in-place tree edits
//! - **model**: The flattened document representation handed to the index
//! - **mapper**: Per-kind mapping from legal XML to index documents (norms,
//!   case law, literature, administrative directives)
//! - **changelog**: Changelog parsing, validation, and merge semantics
//! - **sync**: The synchronization job: locking, changelog discovery,
//!   incremental apply, full reindex, checkpointing
//! - **store**: Object-store abstraction (filesystem, HTTP, in-memory)
//! - **index**: Search-index abstraction (embedded sled index, in-memory)
//! - **config**: Configuration loading and validation
//! - **errors**: Crate-wide error types
//!
//! ## Data Flow
//!
//! 1. A sync run acquires the per-bucket lock and reads the checkpoint
//! 2. Changelog objects newer than the checkpoint are fetched and merged
//! 3. Changed XML documents are fetched, mapped, and upserted
//! 4. Deleted keys are removed from the index
//! 5. The checkpoint is advanced and the lock released
//!
//! A full reindex walks every primary XML object in the bucket instead of
//! consulting changelogs, then removes index entries the walk did not touch.

pub mod changelog;
pub mod config;
pub mod errors;
pub mod index;
pub mod mapper;
pub mod model;
pub mod store;
pub mod sync;
pub mod xml;

pub use config::Config;
pub use errors::{Result, SyncError};

use serde::{Deserialize, Serialize};

/// The four kinds of legal document the system indexes. Each kind lives in
/// its own object-store bucket and has its own XML dialect and mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// Consolidated legislation (acts, statutory instruments)
    Norm,
    /// Court decisions
    CaseLaw,
    /// Bibliographic literature references
    Literature,
    /// Administrative directives issued by agencies
    AdministrativeDirective,
}

impl DocumentKind {
    /// All kinds, in the order sync runs process them.
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Norm,
        DocumentKind::CaseLaw,
        DocumentKind::Literature,
        DocumentKind::AdministrativeDirective,
    ];

    /// Stable identifier used in configuration, logging, and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Norm => "norm",
            DocumentKind::CaseLaw => "case-law",
            DocumentKind::Literature => "literature",
            DocumentKind::AdministrativeDirective => "administrative-directive",
        }
    }

    /// Whether an object key names a primary document of this kind, i.e. an
    /// XML file a sync run should map and index. Keys under the reserved
    /// `changelogs/` and `indexing/` prefixes are never primary, and for
    /// norms only the main body file counts; sibling attachment files are
    /// stitched in by the mapper rather than indexed on their own.
    pub fn is_primary_key(&self, key: &str) -> bool {
        if key.starts_with(crate::changelog::CHANGELOG_PREFIX)
            || key.starts_with(crate::sync::state::INDEXING_PREFIX)
        {
            return false;
        }
        let file_name = key.rsplit('/').next().unwrap_or(key);
        if !file_name.ends_with(".xml") {
            return false;
        }
        match self {
            DocumentKind::Norm => file_name.starts_with("regelungstext"),
            _ => true,
        }
    }

    /// Derives the index document id for an object key of this kind.
    ///
    /// Norm keys are laid out as `<work-or-expression path>/<file>.xml` and
    /// the document id is the path with the file name stripped. For the other
    /// kinds the file stem is the document id. Returns `None` for keys that
    /// cannot name a document (reserved prefixes, missing `.xml` suffix).
    pub fn document_id_for_key(&self, key: &str) -> Option<String> {
        if key.starts_with(crate::changelog::CHANGELOG_PREFIX)
            || key.starts_with(crate::sync::state::INDEXING_PREFIX)
            || !key.ends_with(".xml")
        {
            return None;
        }
        match self {
            DocumentKind::Norm => {
                let (parent, _file) = key.rsplit_once('/')?;
                if parent.is_empty() {
                    None
                } else {
                    Some(parent.to_string())
                }
            }
            _ => {
                let file_name = key.rsplit('/').next().unwrap_or(key);
                Some(file_name.trim_end_matches(".xml").to_string())
            }
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "norm" => Ok(DocumentKind::Norm),
            "case-law" => Ok(DocumentKind::CaseLaw),
            "literature" => Ok(DocumentKind::Literature),
            "administrative-directive" => Ok(DocumentKind::AdministrativeDirective),
            other => Err(SyncError::Config {
                message: format!(
                    "unknown document kind '{}' (expected norm, case-law, literature, or administrative-directive)",
                    other
                ),
            }),
        }
    }
}
