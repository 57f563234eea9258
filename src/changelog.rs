//! # Changelog Module
//!
//! ## Purpose
//! The append-only changelog protocol: writers record which object keys
//! changed or disappeared in small JSON files under `changelogs/`, and sync
//! runs fold every file newer than their checkpoint into a single net
//! instruction set.
//!
//! ## Input/Output Specification
//! - **Input**: Changelog JSON bodies and their object keys
//! - **Output**: A merged `Changelog` where each key appears once, on the
//!   side of its chronologically last mention
//!
//! ## Key Features
//! - Key format `changelogs/<RFC3339-instant>-changelog.json`; the embedded
//!   instant is the protocol's ordering, not store listing order
//! - Last-mention-wins merge; `change_all` escalates across the whole batch
//! - A key in both `changed` and `deleted` rejects the changelog outright

use crate::errors::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reserved object-key prefix for changelog files.
pub const CHANGELOG_PREFIX: &str = "changelogs/";

static CHANGELOG_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^changelogs/(.+)-changelog\.json$").expect("valid changelog regex"));

/// One changelog file: the object keys touched since the previous file.
///
/// `changed` and `deleted` hold object-store keys, not document ids. The
/// sets are kept ordered so serialization and logging are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Changelog {
    pub changed: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    // both spellings occur in the wild, accept either on the wire
    #[serde(alias = "changeAll")]
    pub change_all: bool,
}

impl Changelog {
    /// Parses a changelog body. `key` is used for error reporting only.
    pub fn from_json(key: &str, body: &str) -> Result<Changelog> {
        serde_json::from_str(body).map_err(|e| SyncError::ChangelogParse {
            key: key.to_string(),
            details: e.to_string(),
        })
    }

    /// Rejects changelogs that list a key as both changed and deleted.
    pub fn validate(&self, key: &str) -> Result<()> {
        if let Some(overlap) = self.changed.intersection(&self.deleted).next() {
            return Err(SyncError::ChangelogRejected {
                key: key.to_string(),
                reason: format!("key '{}' listed as both changed and deleted", overlap),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty() && !self.change_all
    }
}

/// Builds the object key for a changelog written at `at`.
pub fn changelog_key(at: DateTime<Utc>) -> String {
    format!(
        "{}{}-changelog.json",
        CHANGELOG_PREFIX,
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Extracts the embedded instant from a changelog key. Returns `None` for
/// keys outside the changelog naming scheme or with an unparsable instant.
pub fn parse_changelog_key(key: &str) -> Option<DateTime<Utc>> {
    let captures = CHANGELOG_KEY_RE.captures(key)?;
    DateTime::parse_from_rfc3339(captures.get(1)?.as_str())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whether any entry in the batch requests a full reindex.
pub fn contains_change_all(entries: &[(String, Changelog)]) -> bool {
    entries.iter().any(|(_, changelog)| changelog.change_all)
}

/// Folds a batch of changelogs into one net changelog.
///
/// Entries are ordered by the instant embedded in their key before folding,
/// so callers may pass them in store listing order. For each key the
/// chronologically last mention wins: a later `changed` revives a deleted
/// key and a later `deleted` retracts a pending change. `change_all` is
/// sticky across the whole batch. Every input is validated; an overlapping
/// changed/deleted pair fails the merge.
pub fn merge(entries: &[(String, Changelog)]) -> Result<Changelog> {
    for (key, changelog) in entries {
        changelog.validate(key)?;
    }

    let mut ordered: Vec<&(String, Changelog)> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        match (parse_changelog_key(&a.0), parse_changelog_key(&b.0)) {
            (Some(ta), Some(tb)) => ta.cmp(&tb).then_with(|| a.0.cmp(&b.0)),
            // RFC3339 keys sort lexicographically in chronological order,
            // so fall back to the raw key for anything unparsable
            _ => a.0.cmp(&b.0),
        }
    });

    let mut result = Changelog::default();
    for (_, changelog) in ordered {
        result.change_all |= changelog.change_all;
        for key in &changelog.changed {
            result.deleted.remove(key);
            result.changed.insert(key.clone());
        }
        for key in &changelog.deleted {
            result.changed.remove(key);
            result.deleted.insert(key.clone());
        }
    }
    Ok(result)
}
