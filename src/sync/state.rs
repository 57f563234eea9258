//! # Indexing State Module
//!
//! ## Purpose
//! Checkpoint and lock persistence for the synchronization job. Both live
//! as small JSON objects under the `indexing/` prefix of the kind's bucket,
//! split into separate objects so lock flips never rewrite the checkpoint.
//!
//! ## Key Features
//! - Checkpoint (`indexing/state.json`): last processed changelog file and
//!   last success timestamp, camelCase on the wire
//! - Lock marker (`indexing/lock.json`): run id and acquisition time;
//!   presence of the object is the lock
//! - Non-blocking acquisition: a held lock reads as busy, never as a wait

use crate::errors::{Result, SyncError};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Prefix reserved for job status objects; keys beneath it are never
/// treated as documents.
pub const INDEXING_PREFIX: &str = "indexing/";

/// Checkpoint object key.
pub const STATE_KEY: &str = "indexing/state.json";

/// Lock marker object key.
pub const LOCK_KEY: &str = "indexing/lock.json";

/// Synchronization checkpoint for one document kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingState {
    /// Key of the newest fully applied changelog file
    pub last_processed_changelog_file: Option<String>,
    /// Completion instant of the last successful run
    pub last_success_timestamp: Option<DateTime<Utc>>,
}

/// Marker object written while a run holds the per-kind lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockMarker {
    pub run_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}

/// Reads the checkpoint. A missing object means no run has completed yet;
/// a present but unreadable object is corrupt state and surfaces as an
/// error rather than silently triggering a reindex.
pub async fn load_state(store: &dyn ObjectStore) -> Result<Option<IndexingState>> {
    let Some(body) = store.get_string(STATE_KEY).await? else {
        return Ok(None);
    };
    let state = serde_json::from_str(&body).map_err(|e| SyncError::InvalidState {
        details: format!("checkpoint {} unreadable: {}", STATE_KEY, e),
    })?;
    Ok(Some(state))
}

pub async fn save_state(store: &dyn ObjectStore, state: &IndexingState) -> Result<()> {
    let body = serde_json::to_vec(state)?;
    store.put(STATE_KEY, body).await?;
    debug!(
        checkpoint = state.last_processed_changelog_file.as_deref().unwrap_or("-"),
        "checkpoint persisted"
    );
    Ok(())
}

/// Attempts to take the per-kind lock without blocking. Returns `false`
/// when another run already holds it.
pub async fn try_acquire_lock(store: &dyn ObjectStore, run_id: Uuid) -> Result<bool> {
    if store.get(LOCK_KEY).await?.is_some() {
        return Ok(false);
    }
    let marker = LockMarker {
        run_id,
        acquired_at: Utc::now(),
    };
    let body = serde_json::to_vec(&marker)?;
    store.put(LOCK_KEY, body).await?;
    debug!(run_id = %run_id, "lock acquired");
    Ok(true)
}

pub async fn release_lock(store: &dyn ObjectStore) -> Result<()> {
    store.delete(LOCK_KEY).await?;
    debug!("lock released");
    Ok(())
}

/// Reads the current lock marker for display. `None` covers both a missing
/// object and an unreadable body; acquisition checks raw presence, so an
/// unreadable marker still blocks new runs until it is deleted.
pub async fn current_lock(store: &dyn ObjectStore) -> Result<Option<LockMarker>> {
    let Some(body) = store.get_string(LOCK_KEY).await? else {
        return Ok(None);
    };
    Ok(serde_json::from_str(&body).ok())
}
