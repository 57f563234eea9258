//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the index synchronization service, providing
//! structured error types for every subsystem and the helpers the job
//! orchestrator uses to decide between retrying and skipping.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from XML access, mapping, storage, index and sync components
//! - **Output**: Structured error types with context, retryability and category
//! - **Error Categories**: Configuration, XML, Mapping, Changelog, Store, Index, Sync
//!
//! ## Key Features
//! - Distinguishes retryable infrastructure failures from permanent input failures
//! - A missing mandatory identifier is *not* an error (mappers return `Ok(None)`)
//! - Category labels for structured logging
//!
//! ## Usage
//! ```rust
//! use legal_index_sync::errors::{Result, SyncError};
//!
//! fn load_checkpoint() -> Result<()> {
//!     Err(SyncError::StoreUnavailable {
//!         operation: "get indexing/state.json".to_string(),
//!         details: "connection refused".to_string(),
//!     })
//! }
//! ```

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types for the index synchronization service
#[derive(Debug, Error)]
pub enum SyncError {
    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors for configuration values
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// The source document is not well-formed XML (or carries a DTD)
    #[error("Malformed XML: {details}")]
    XmlParse { details: String },

    /// A path expression could not be parsed or evaluated
    #[error("XML query failed for path '{path}': {details}")]
    QueryFailed { path: String, details: String },

    /// Document mapping failed for a reason other than a missing identifier
    #[error("Failed to map document '{key}': {details}")]
    DocumentMapping { key: String, details: String },

    /// Object store could not be reached or answered with a transient failure
    #[error("Object store unavailable during '{operation}': {details}")]
    StoreUnavailable { operation: String, details: String },

    /// Search index operation failed
    #[error("Index operation '{operation}' failed: {details}")]
    Index { operation: String, details: String },

    /// A changelog body could not be parsed
    #[error("Failed to parse changelog '{key}': {details}")]
    ChangelogParse { key: String, details: String },

    /// A changelog references the same key as both changed and deleted
    #[error("Changelog '{key}' rejected: {reason}")]
    ChangelogRejected { key: String, reason: String },

    /// An ad-hoc changelog was submitted while a scheduled run holds the lock
    #[error("Synchronization already in progress for {kind}")]
    SyncInProgress { kind: String },

    /// Persisted indexing state could not be interpreted
    #[error("Invalid indexing state: {details}")]
    InvalidState { details: String },

    /// Serialization/deserialization errors
    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Check if the error is retryable on a later scheduled run.
    ///
    /// Retryable failures abort the current run without advancing the
    /// checkpoint, so the affected changelog range is picked up again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Io(_) | SyncError::StoreUnavailable { .. } | SyncError::Index { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Config { .. } | SyncError::ValidationFailed { .. } => "configuration",
            SyncError::XmlParse { .. } | SyncError::QueryFailed { .. } => "xml",
            SyncError::DocumentMapping { .. } => "mapping",
            SyncError::StoreUnavailable { .. } => "store",
            SyncError::Index { .. } => "index",
            SyncError::ChangelogParse { .. } | SyncError::ChangelogRejected { .. } => "changelog",
            SyncError::SyncInProgress { .. } | SyncError::InvalidState { .. } => "sync",
            SyncError::Io(_) | SyncError::Serialization { .. } | SyncError::Internal { .. } => {
                "generic"
            }
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization {
            message: format!("JSON serialization error: {}", err),
        }
    }
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Serialization {
            message: format!("Binary serialization error: {}", err),
        }
    }
}
