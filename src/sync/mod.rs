//! # Synchronization Module
//!
//! ## Purpose
//! The incremental index synchronization job: one `Synchronizer` per
//! document kind drives its bucket's changelog stream into the search
//! index, or rebuilds the index from scratch when no checkpoint exists.
//!
//! ## Run Protocol
//! 1. Take the per-kind lock without blocking; a held lock ends the run as
//!    `SkippedLocked`
//! 2. No checkpoint: enumerate every primary key, map and bulk-upsert in
//!    batches, sweep index entries older than the run start, checkpoint at
//!    the newest changelog present when the run began
//! 3. With a checkpoint: apply all strictly newer changelogs in timestamp
//!    order after a last-mention-wins merge; a `changeAll` anywhere
//!    escalates to the full rebuild
//! 4. Persist the checkpoint only after full application; release the lock
//!    in every outcome
//! 5. Compare store and index document counts, warning on mismatch
//!
//! Document-level failures are logged, counted, and skipped; transient
//! store or index failures abort the run with the checkpoint unmoved.

pub mod state;

use crate::changelog::{
    changelog_key, contains_change_all, merge, parse_changelog_key, Changelog, CHANGELOG_PREFIX,
};
use crate::config::SyncConfig;
use crate::errors::{Result, SyncError};
use crate::index::SearchIndex;
use crate::mapper::{mapper_for, AttachmentSet, DocumentMapper};
use crate::model::LegalDocument;
use crate::store::ObjectStore;
use crate::DocumentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use self::state::IndexingState;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a synchronization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another run held the lock; nothing was done
    SkippedLocked,
    /// The index was rebuilt from every primary key in the store
    ReindexedAll,
    /// New changelogs were merged and applied incrementally
    AppliedChangelogs,
    /// The checkpoint was already current
    NoNewChangelogs,
}

/// Run execution statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    /// Documents written to the index
    pub upserted: usize,
    /// Documents removed from the index (explicit deletes and stale sweeps)
    pub deleted: usize,
    /// Documents that failed to map
    pub failed: usize,
    /// Keys skipped (not indexable, missing, or unreadable changelog)
    pub skipped: usize,
    /// Index writes per second over the run
    pub processing_rate: f64,
}

impl Default for SyncStats {
    fn default() -> Self {
        Self {
            upserted: 0,
            deleted: 0,
            failed: 0,
            skipped: 0,
            processing_rate: 0.0,
        }
    }
}

/// Report of one synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub outcome: SyncOutcome,
    pub stats: SyncStats,
    /// Per-document failure descriptions, keyed by storage key
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Drives one document kind's bucket into the search index.
pub struct Synchronizer {
    kind: DocumentKind,
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn SearchIndex>,
    mapper: Box<dyn DocumentMapper>,
    batch_size: usize,
}

impl Synchronizer {
    pub fn new(
        kind: DocumentKind,
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn SearchIndex>,
        config: &SyncConfig,
    ) -> Self {
        Synchronizer {
            kind,
            store,
            index,
            mapper: mapper_for(kind),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Executes one scheduled synchronization run.
    pub async fn run(&self) -> Result<SyncRun> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(kind = %self.kind, run_id = %id, "synchronization run starting");

        if !state::try_acquire_lock(self.store.as_ref(), id).await? {
            info!(kind = %self.kind, "another run holds the lock, skipping");
            return Ok(self.report(id, started_at, SyncOutcome::SkippedLocked, SyncStats::default(), Vec::new()));
        }

        let result = self.run_locked(started_at).await;
        if let Err(e) = state::release_lock(self.store.as_ref()).await {
            warn!(kind = %self.kind, error = %e, "failed to release lock");
        }

        let (outcome, stats, errors) = result?;
        self.audit_count().await;
        let run = self.report(id, started_at, outcome, stats, errors);
        info!(
            kind = %self.kind,
            run_id = %id,
            outcome = ?run.outcome,
            upserted = run.stats.upserted,
            deleted = run.stats.deleted,
            failed = run.stats.failed,
            skipped = run.stats.skipped,
            "synchronization run finished"
        );
        Ok(run)
    }

    /// Rebuilds the index regardless of checkpoint state. Scheduled runs
    /// never rebuild on their own once a checkpoint exists; this is the
    /// explicit operator path.
    pub async fn force_reindex(&self) -> Result<SyncRun> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(kind = %self.kind, run_id = %id, "forced full rebuild starting");

        if !state::try_acquire_lock(self.store.as_ref(), id).await? {
            return Err(SyncError::SyncInProgress {
                kind: self.kind.to_string(),
            });
        }

        let result: Result<(SyncStats, Vec<String>)> = async {
            let (stats, errors, cursor) = self.reindex_all(started_at).await?;
            self.advance_checkpoint(cursor).await?;
            Ok((stats, errors))
        }
        .await;
        if let Err(e) = state::release_lock(self.store.as_ref()).await {
            warn!(kind = %self.kind, error = %e, "failed to release lock");
        }

        let (stats, errors) = result?;
        self.audit_count().await;
        Ok(self.report(id, started_at, SyncOutcome::ReindexedAll, stats, errors))
    }

    /// Applies one changelog body immediately, outside the changelog file
    /// stream. The checkpoint is not advanced: ad-hoc bodies are not files
    /// in the store, so the next scheduled run must not skip past anything.
    pub async fn apply_adhoc_json(&self, body: &str) -> Result<SyncRun> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let changelog = Changelog::from_json("adhoc", body)?;
        changelog.validate("adhoc")?;

        if !state::try_acquire_lock(self.store.as_ref(), id).await? {
            return Err(SyncError::SyncInProgress {
                kind: self.kind.to_string(),
            });
        }

        let result = if changelog.change_all {
            info!(kind = %self.kind, "ad-hoc changeAll, rebuilding index from scratch");
            self.reindex_all(started_at)
                .await
                .map(|(stats, errors, _)| (SyncOutcome::ReindexedAll, stats, errors))
        } else {
            self.apply_changelog(&changelog)
                .await
                .map(|(stats, errors)| (SyncOutcome::AppliedChangelogs, stats, errors))
        };
        if let Err(e) = state::release_lock(self.store.as_ref()).await {
            warn!(kind = %self.kind, error = %e, "failed to release lock");
        }

        let (outcome, stats, errors) = result?;
        Ok(self.report(id, started_at, outcome, stats, errors))
    }

    async fn run_locked(
        &self,
        run_start: DateTime<Utc>,
    ) -> Result<(SyncOutcome, SyncStats, Vec<String>)> {
        match state::load_state(self.store.as_ref()).await? {
            None => {
                info!(kind = %self.kind, "no checkpoint, rebuilding index from scratch");
                let (stats, errors, cursor) = self.reindex_all(run_start).await?;
                self.advance_checkpoint(cursor).await?;
                Ok((SyncOutcome::ReindexedAll, stats, errors))
            }
            Some(checkpoint) => self.apply_new_changelogs(run_start, checkpoint).await,
        }
    }

    /// Full rebuild: every primary key is mapped and upserted, then index
    /// entries untouched by this run are swept. Returns the checkpoint
    /// cursor the rebuild stands for: the newest changelog key present when
    /// the run began, or a synthesized key at the run start when the bucket
    /// has no changelogs yet.
    async fn reindex_all(
        &self,
        run_start: DateTime<Utc>,
    ) -> Result<(SyncStats, Vec<String>, String)> {
        let mut listed: Vec<(DateTime<Utc>, String)> = self
            .store
            .list_keys(CHANGELOG_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| parse_changelog_key(&key).map(|ts| (ts, key)))
            .collect();
        listed.sort();
        let cursor = match listed.pop() {
            Some((_, key)) => key,
            None => changelog_key(run_start),
        };

        let keys = self.primary_keys().await?;
        info!(kind = %self.kind, documents = keys.len(), "rebuilding index");

        let mut stats = SyncStats::default();
        let mut errors = Vec::new();
        let mut batch: Vec<(String, LegalDocument)> = Vec::new();
        for key in &keys {
            match self.load_and_map(key).await {
                Ok(Some(entry)) => {
                    batch.push(entry);
                    if batch.len() >= self.batch_size {
                        stats.upserted += self.index.bulk_upsert(&batch).await?;
                        batch.clear();
                    }
                }
                Ok(None) => {
                    debug!(key = key.as_str(), "no indexable document behind key");
                    stats.skipped += 1;
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "document failed to map, skipping");
                    errors.push(format!("{}: {}", key, e));
                    stats.failed += 1;
                }
            }
        }
        if !batch.is_empty() {
            stats.upserted += self.index.bulk_upsert(&batch).await?;
        }

        let swept = self.index.delete_by_indexed_at_before(run_start).await?;
        if swept > 0 {
            info!(kind = %self.kind, swept, "removed index entries no longer in the store");
        }
        stats.deleted += swept;

        Ok((stats, errors, cursor))
    }

    async fn apply_new_changelogs(
        &self,
        run_start: DateTime<Utc>,
        checkpoint: IndexingState,
    ) -> Result<(SyncOutcome, SyncStats, Vec<String>)> {
        let since = checkpoint
            .last_processed_changelog_file
            .as_deref()
            .and_then(parse_changelog_key);

        let mut pending: Vec<(DateTime<Utc>, String)> = self
            .store
            .list_keys(CHANGELOG_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| parse_changelog_key(&key).map(|ts| (ts, key)))
            .filter(|(ts, _)| since.map_or(true, |cp| *ts > cp))
            .collect();
        pending.sort();

        let Some((_, newest_key)) = pending.last().cloned() else {
            debug!(kind = %self.kind, "checkpoint is current, nothing to apply");
            return Ok((SyncOutcome::NoNewChangelogs, SyncStats::default(), Vec::new()));
        };

        let mut stats = SyncStats::default();
        let mut entries = Vec::new();
        for (_, key) in &pending {
            match self.store.get_string(key).await? {
                None => {
                    warn!(changelog = key.as_str(), "changelog listed but missing, skipping");
                    stats.skipped += 1;
                }
                Some(body) => match Changelog::from_json(key, &body) {
                    Ok(changelog) => entries.push((key.clone(), changelog)),
                    Err(e) => {
                        warn!(changelog = key.as_str(), error = %e, "unreadable changelog, skipping");
                        stats.skipped += 1;
                    }
                },
            }
        }

        if contains_change_all(&entries) {
            info!(kind = %self.kind, "changeAll requested, escalating to a full rebuild");
            let (mut rebuild_stats, errors, cursor) = self.reindex_all(run_start).await?;
            rebuild_stats.skipped += stats.skipped;
            self.advance_checkpoint(cursor).await?;
            return Ok((SyncOutcome::ReindexedAll, rebuild_stats, errors));
        }

        let merged = merge(&entries)?;
        info!(
            kind = %self.kind,
            changelogs = entries.len(),
            changed = merged.changed.len(),
            deleted = merged.deleted.len(),
            "applying merged changelogs"
        );
        let (apply_stats, errors) = self.apply_changelog(&merged).await?;
        stats.upserted += apply_stats.upserted;
        stats.deleted += apply_stats.deleted;
        stats.failed += apply_stats.failed;
        stats.skipped += apply_stats.skipped;

        self.advance_checkpoint(newest_key).await?;
        Ok((SyncOutcome::AppliedChangelogs, stats, errors))
    }

    /// Applies one merged changelog: upserts for changed keys, deletes for
    /// deleted keys. Document-level failures never abort the application.
    async fn apply_changelog(&self, changelog: &Changelog) -> Result<(SyncStats, Vec<String>)> {
        let mut stats = SyncStats::default();
        let mut errors = Vec::new();

        let mut batch: Vec<(String, LegalDocument)> = Vec::new();
        for key in &changelog.changed {
            if !self.kind.is_primary_key(key) {
                debug!(key = key.as_str(), "changed key is not a primary document, skipping");
                stats.skipped += 1;
                continue;
            }
            match self.load_and_map(key).await {
                Ok(Some(entry)) => {
                    batch.push(entry);
                    if batch.len() >= self.batch_size {
                        stats.upserted += self.index.bulk_upsert(&batch).await?;
                        batch.clear();
                    }
                }
                Ok(None) => {
                    warn!(key = key.as_str(), "changed key missing or not indexable, skipping");
                    stats.skipped += 1;
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "document failed to map, skipping");
                    errors.push(format!("{}: {}", key, e));
                    stats.failed += 1;
                }
            }
        }
        if !batch.is_empty() {
            stats.upserted += self.index.bulk_upsert(&batch).await?;
        }

        for key in &changelog.deleted {
            match self.kind.document_id_for_key(key) {
                Some(id) => {
                    if self.index.delete_by_id(&id).await? {
                        stats.deleted += 1;
                    } else {
                        debug!(key = key.as_str(), id = id.as_str(), "delete for document not in index");
                    }
                }
                None => {
                    debug!(key = key.as_str(), "no document id derivable, ignoring delete");
                    stats.skipped += 1;
                }
            }
        }

        Ok((stats, errors))
    }

    /// Fetches and maps one primary key. Norm documents get their sibling
    /// attachment files alongside; a missing object reads as not indexable.
    async fn load_and_map(&self, key: &str) -> Result<Option<(String, LegalDocument)>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        let attachments = if self.kind == DocumentKind::Norm {
            self.sibling_attachments(key).await?
        } else {
            AttachmentSet::new()
        };
        let Some(document) = self.mapper.map(&bytes, &attachments)? else {
            return Ok(None);
        };
        Ok(Some((document.id().to_string(), document)))
    }

    /// Collects non-primary XML objects sharing the key's parent path; for
    /// norms these are the attachment manifestations the mapper may stitch.
    async fn sibling_attachments(&self, key: &str) -> Result<AttachmentSet> {
        let mut attachments = AttachmentSet::new();
        let Some((parent, _)) = key.rsplit_once('/') else {
            return Ok(attachments);
        };
        let prefix = format!("{}/", parent);
        for sibling in self.store.list_keys(&prefix).await? {
            if sibling == key || !sibling.ends_with(".xml") || self.kind.is_primary_key(&sibling) {
                continue;
            }
            if let Some(bytes) = self.store.get(&sibling).await? {
                attachments.insert(&sibling, bytes);
            }
        }
        Ok(attachments)
    }

    async fn advance_checkpoint(&self, cursor: String) -> Result<()> {
        let next = IndexingState {
            last_processed_changelog_file: Some(cursor),
            last_success_timestamp: Some(Utc::now()),
        };
        state::save_state(self.store.as_ref(), &next).await
    }

    async fn primary_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_keys("")
            .await?
            .into_iter()
            .filter(|key| self.kind.is_primary_key(key))
            .collect())
    }

    /// Sanity check after a successful run: the number of indexed documents
    /// should match the number of primary keys. Divergence is reported,
    /// never acted on.
    async fn audit_count(&self) {
        let stored = match self.primary_keys().await {
            Ok(keys) => keys.len(),
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "count audit could not list the store");
                return;
            }
        };
        let indexed = match self.index.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "count audit could not count the index");
                return;
            }
        };
        if stored != indexed {
            warn!(kind = %self.kind, stored, indexed, "store and index document counts differ");
        } else {
            debug!(kind = %self.kind, count = indexed, "store and index document counts agree");
        }
    }

    fn report(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        outcome: SyncOutcome,
        mut stats: SyncStats,
        errors: Vec<String>,
    ) -> SyncRun {
        let completed_at = Utc::now();
        let elapsed = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            stats.processing_rate = (stats.upserted + stats.deleted) as f64 / elapsed;
        }
        SyncRun {
            id,
            kind: self.kind,
            outcome,
            stats,
            errors,
            started_at,
            completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemorySearchIndex;
    use crate::store::MemoryObjectStore;

    fn norm_xml(work: &str, expression: &str, title: &str) -> String {
        format!(
            r#"<akn:akomaNtoso xmlns:akn="http://Inhaltsdaten.LegalDocML.de/1.6/">
  <akn:act name="regelungstext">
    <akn:meta>
      <akn:identification>
        <akn:FRBRWork><akn:FRBRuri value="{work}"/></akn:FRBRWork>
        <akn:FRBRExpression><akn:FRBRuri value="{expression}"/></akn:FRBRExpression>
      </akn:identification>
    </akn:meta>
    <akn:preface><akn:longTitle><akn:p><akn:docTitle>{title}</akn:docTitle></akn:p></akn:longTitle></akn:preface>
    <akn:body>
      <akn:article eId="art-1"><akn:num>&#167; 1</akn:num>
        <akn:paragraph eId="art-1_abs-1"><akn:content><akn:p>Inhalt von {title}.</akn:p></akn:content></akn:paragraph>
      </akn:article>
    </akn:body>
  </akn:act>
</akn:akomaNtoso>"#
        )
    }

    const EXPR_A: &str = "eli/bund/bgbl-1/2020/s100/2020-01-01/1/deu";
    const EXPR_B: &str = "eli/bund/bgbl-1/2021/s200/2021-06-01/1/deu";

    fn key_a() -> String {
        format!("{EXPR_A}/regelungstext-1.xml")
    }

    fn key_b() -> String {
        format!("{EXPR_B}/regelungstext-1.xml")
    }

    async fn seed_two_norms(store: &MemoryObjectStore) {
        store
            .put_string(
                &key_a(),
                &norm_xml("eli/bund/bgbl-1/2020/s100", EXPR_A, "Erstes Gesetz"),
            )
            .await
            .unwrap();
        store
            .put_string(
                &key_b(),
                &norm_xml("eli/bund/bgbl-1/2021/s200", EXPR_B, "Zweites Gesetz"),
            )
            .await
            .unwrap();
    }

    fn synchronizer(
        store: &Arc<MemoryObjectStore>,
        index: &Arc<MemorySearchIndex>,
    ) -> Synchronizer {
        Synchronizer::new(
            DocumentKind::Norm,
            store.clone() as Arc<dyn ObjectStore>,
            index.clone() as Arc<dyn SearchIndex>,
            &SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_bootstrap_reindex_then_no_op() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);

        let first = sync.run().await.unwrap();
        assert_eq!(first.outcome, SyncOutcome::ReindexedAll);
        assert_eq!(first.stats.upserted, 2);
        assert_eq!(first.stats.failed, 0);
        assert_eq!(index.count().await.unwrap(), 2);

        let checkpoint = state::load_state(store.as_ref()).await.unwrap().unwrap();
        assert!(checkpoint.last_processed_changelog_file.is_some());

        // a second run with no new changelogs must not touch the index
        let second = sync.run().await.unwrap();
        assert_eq!(second.outcome, SyncOutcome::NoNewChangelogs);
        assert_eq!(second.stats.upserted, 0);
        assert_eq!(second.stats.deleted, 0);
        let unchanged = state::load_state(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(
            unchanged.last_processed_changelog_file,
            checkpoint.last_processed_changelog_file
        );
    }

    #[tokio::test]
    async fn test_changelog_application() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);
        sync.run().await.unwrap();

        // newer than the synthesized bootstrap cursor
        let later = Utc::now() + chrono::Duration::seconds(5);
        let body = serde_json::json!({
            "changed": [key_b()],
            "deleted": [key_a()],
        });
        store
            .put_string(&changelog_key(later), &body.to_string())
            .await
            .unwrap();

        let run = sync.run().await.unwrap();
        assert_eq!(run.outcome, SyncOutcome::AppliedChangelogs);
        assert_eq!(run.stats.upserted, 1);
        assert_eq!(run.stats.deleted, 1);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.get(EXPR_B).await.is_some());
        assert!(index.get(EXPR_A).await.is_none());

        let checkpoint = state::load_state(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(
            checkpoint.last_processed_changelog_file,
            Some(changelog_key(later))
        );
    }

    #[tokio::test]
    async fn test_change_all_escalates_to_full_rebuild() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);
        sync.run().await.unwrap();

        // a document that only a full enumeration would pick up
        let expr_c = "eli/bund/bgbl-1/2022/s300/2022-03-01/1/deu";
        store
            .put_string(
                &format!("{expr_c}/regelungstext-1.xml"),
                &norm_xml("eli/bund/bgbl-1/2022/s300", expr_c, "Drittes Gesetz"),
            )
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        store
            .put_string(&changelog_key(later), r#"{"changeAll": true}"#)
            .await
            .unwrap();

        let run = sync.run().await.unwrap();
        assert_eq!(run.outcome, SyncOutcome::ReindexedAll);
        assert_eq!(index.count().await.unwrap(), 3);
        assert!(index.get(expr_c).await.is_some());

        let checkpoint = state::load_state(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(
            checkpoint.last_processed_changelog_file,
            Some(changelog_key(later))
        );
    }

    #[tokio::test]
    async fn test_held_lock_skips_run_and_stays_held() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);

        let foreign = Uuid::new_v4();
        assert!(state::try_acquire_lock(store.as_ref(), foreign)
            .await
            .unwrap());

        let run = sync.run().await.unwrap();
        assert_eq!(run.outcome, SyncOutcome::SkippedLocked);
        assert_eq!(index.count().await.unwrap(), 0);

        // the foreign lock must survive the skipped run
        let held = state::current_lock(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(held.run_id, foreign);
    }

    #[tokio::test]
    async fn test_malformed_changelog_skipped_and_checkpoint_advances() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);
        sync.run().await.unwrap();

        let t1 = Utc::now() + chrono::Duration::seconds(5);
        let t2 = t1 + chrono::Duration::seconds(5);
        store
            .put_string(&changelog_key(t1), "this is not json")
            .await
            .unwrap();
        store
            .put_string(
                &changelog_key(t2),
                &serde_json::json!({ "changed": [key_a()] }).to_string(),
            )
            .await
            .unwrap();

        let run = sync.run().await.unwrap();
        assert_eq!(run.outcome, SyncOutcome::AppliedChangelogs);
        assert_eq!(run.stats.skipped, 1);
        assert_eq!(run.stats.upserted, 1);
        let checkpoint = state::load_state(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(
            checkpoint.last_processed_changelog_file,
            Some(changelog_key(t2))
        );
    }

    #[tokio::test]
    async fn test_document_failure_is_counted_not_fatal() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        store
            .put_string(
                "eli/bund/bgbl-1/2023/s1/2023-01-01/1/deu/regelungstext-1.xml",
                "<akn:broken",
            )
            .await
            .unwrap();
        let sync = synchronizer(&store, &index);

        let run = sync.run().await.unwrap();
        assert_eq!(run.outcome, SyncOutcome::ReindexedAll);
        assert_eq!(run.stats.upserted, 2);
        assert_eq!(run.stats.failed, 1);
        assert_eq!(run.errors.len(), 1);
        assert!(run.errors[0].contains("2023/s1"));
    }

    #[tokio::test]
    async fn test_reindex_sweeps_documents_no_longer_in_store() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;

        // an entry from an earlier life of the index, no longer backed by
        // any stored object
        index
            .upsert(
                "eli/bund/bgbl-1/1999/s9/1999-01-01/1/deu",
                &LegalDocument::Norm(crate::model::NormDocument {
                    work_eli: "eli/bund/bgbl-1/1999/s9".into(),
                    expression_eli: "eli/bund/bgbl-1/1999/s9/1999-01-01/1/deu".into(),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let sync = synchronizer(&store, &index);
        let run = sync.run().await.unwrap();

        assert_eq!(run.outcome, SyncOutcome::ReindexedAll);
        assert_eq!(run.stats.deleted, 1);
        assert_eq!(index.count().await.unwrap(), 2);
        assert!(index
            .get("eli/bund/bgbl-1/1999/s9/1999-01-01/1/deu")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_adhoc_apply_is_idempotent() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);
        sync.run().await.unwrap();
        let checkpoint_before = state::load_state(store.as_ref()).await.unwrap();

        let body = serde_json::json!({
            "changed": [key_b()],
            "deleted": [key_a()],
        })
        .to_string();

        let first = sync.apply_adhoc_json(&body).await.unwrap();
        assert_eq!(first.outcome, SyncOutcome::AppliedChangelogs);
        assert_eq!(first.stats.upserted, 1);
        assert_eq!(first.stats.deleted, 1);

        // replaying the same body converges on the same index state
        let second = sync.apply_adhoc_json(&body).await.unwrap();
        assert_eq!(second.stats.upserted, 1);
        assert_eq!(second.stats.deleted, 0);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index.get(EXPR_B).await.is_some());
        assert!(index.get(EXPR_A).await.is_none());

        // ad-hoc application never moves the checkpoint
        let checkpoint_after = state::load_state(store.as_ref()).await.unwrap();
        assert_eq!(checkpoint_before, checkpoint_after);
    }

    #[tokio::test]
    async fn test_force_reindex_ignores_current_checkpoint() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        seed_two_norms(&store).await;
        let sync = synchronizer(&store, &index);
        sync.run().await.unwrap();

        // without changelogs a scheduled run would never see this document
        let expr_c = "eli/bund/bgbl-1/2022/s300/2022-03-01/1/deu";
        store
            .put_string(
                &format!("{expr_c}/regelungstext-1.xml"),
                &norm_xml("eli/bund/bgbl-1/2022/s300", expr_c, "Drittes Gesetz"),
            )
            .await
            .unwrap();
        let scheduled = sync.run().await.unwrap();
        assert_eq!(scheduled.outcome, SyncOutcome::NoNewChangelogs);
        assert_eq!(index.count().await.unwrap(), 2);

        let forced = sync.force_reindex().await.unwrap();
        assert_eq!(forced.outcome, SyncOutcome::ReindexedAll);
        assert_eq!(index.count().await.unwrap(), 3);
        assert!(index.get(expr_c).await.is_some());
    }

    #[tokio::test]
    async fn test_adhoc_rejected_while_lock_held() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let sync = synchronizer(&store, &index);

        state::try_acquire_lock(store.as_ref(), Uuid::new_v4())
            .await
            .unwrap();
        let result = sync.apply_adhoc_json(r#"{"changed": []}"#).await;
        assert!(matches!(result, Err(SyncError::SyncInProgress { .. })));
    }

    #[tokio::test]
    async fn test_adhoc_rejects_overlap_and_garbage() {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let sync = synchronizer(&store, &index);

        let overlap = serde_json::json!({
            "changed": ["a.xml"],
            "deleted": ["a.xml"],
        })
        .to_string();
        assert!(matches!(
            sync.apply_adhoc_json(&overlap).await,
            Err(SyncError::ChangelogRejected { .. })
        ));

        assert!(matches!(
            sync.apply_adhoc_json("{broken").await,
            Err(SyncError::ChangelogParse { .. })
        ));

        // a failed validation must not leave the lock behind
        assert_eq!(state::current_lock(store.as_ref()).await.unwrap(), None);
    }
}
