// src/extraction/ledger.rs
//! The record of which (repository, content kind) extractions are complete.
//!
//! Entries are created when a repository enters the harvest scope and gain a
//! completion timestamp when its extraction for a kind finishes. They are
//! never deleted, so the ledger alone decides what a resumed run still has
//! to do.

use crate::error::AppError;
use crate::types::{ContentKind, RepoFullName};
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One unit of extraction work.
pub type WorkItem = (RepoFullName, ContentKind);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entity_id: RepoFullName,
    pub content_kind: ContentKind,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn key(&self) -> WorkItem {
        (self.entity_id.clone(), self.content_kind)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Durable completion tracking keyed by `(entity, content kind)`.
///
/// Implementations update each key independently; concurrent writers to
/// different keys never contend and a write to one key is atomic.
#[async_trait::async_trait]
pub trait ExtractionLedger: Send + Sync {
    /// Brings entities into scope, creating open entries for missing keys.
    /// Existing entries are left untouched. Returns how many were created.
    async fn register(
        &self,
        entities: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<usize, AppError>;

    /// The pairs of `entities x kinds` that are not yet complete.
    async fn pending(
        &self,
        entities: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<BTreeSet<WorkItem>, AppError>;

    /// Records completion. Marking a completed pair again overwrites its timestamp.
    async fn mark_complete(
        &self,
        entity: &RepoFullName,
        kind: ContentKind,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Every entry, in key order.
    async fn entries(&self) -> Result<Vec<LedgerEntry>, AppError>;
}

/// Ledger held in memory only: for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: DashMap<WorkItem, Option<DateTime<Utc>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExtractionLedger for MemoryLedger {
    async fn register(
        &self,
        entities: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<usize, AppError> {
        let mut created = 0;
        for entity in entities {
            for &kind in kinds {
                self.entries
                    .entry((entity.clone(), kind))
                    .or_insert_with(|| {
                        created += 1;
                        None
                    });
            }
        }
        Ok(created)
    }

    async fn pending(
        &self,
        entities: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<BTreeSet<WorkItem>, AppError> {
        Ok(pending_from(entities, kinds, |key| {
            self.entries.get(key).is_some_and(|entry| entry.is_some())
        }))
    }

    async fn mark_complete(
        &self,
        entity: &RepoFullName,
        kind: ContentKind,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.entries.insert((entity.clone(), kind), Some(at));
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(sorted_entries(self.entries.iter().map(|entry| {
            let (entity_id, content_kind) = entry.key().clone();
            LedgerEntry {
                entity_id,
                content_kind,
                completed_at: *entry.value(),
            }
        })))
    }
}

/// Collects the requested pairs that `is_complete` rejects.
pub(super) fn pending_from(
    entities: &[RepoFullName],
    kinds: &[ContentKind],
    is_complete: impl Fn(&WorkItem) -> bool,
) -> BTreeSet<WorkItem> {
    entities
        .iter()
        .flat_map(|entity| kinds.iter().map(move |&kind| (entity.clone(), kind)))
        .filter(|key| !is_complete(key))
        .collect()
}

pub(super) fn sorted_entries(entries: impl Iterator<Item = LedgerEntry>) -> Vec<LedgerEntry> {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.key().cmp(&b.key()));
    entries
}

/// Renders the aggregation history: one row per repository, one column per
/// content kind, holding the completion time or nothing.
pub fn render_history(entries: &[LedgerEntry], kinds: &[ContentKind]) -> String {
    let mut rows: BTreeMap<&RepoFullName, BTreeMap<ContentKind, DateTime<Utc>>> = BTreeMap::new();
    for entry in entries {
        let row = rows.entry(&entry.entity_id).or_default();
        if let Some(at) = entry.completed_at {
            row.insert(entry.content_kind, at);
        }
    }

    let mut csv = String::from("repository");
    for kind in kinds {
        csv.push(',');
        csv.push_str(kind.as_str());
    }
    csv.push('\n');

    for (entity, completed) in rows {
        csv.push_str(entity.as_str());
        for kind in kinds {
            csv.push(',');
            if let Some(at) = completed.get(kind) {
                csv.push_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
        }
        csv.push('\n');
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn repo(name: &str) -> RepoFullName {
        RepoFullName::parse(name).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn pending_shrinks_as_pairs_complete() {
        let ledger = MemoryLedger::new();
        let repos = vec![repo("a/one"), repo("b/two")];
        let kinds = [ContentKind::Issues, ContentKind::Releases];

        assert_eq!(ledger.register(&repos, &kinds).await.unwrap(), 4);
        assert_eq!(ledger.register(&repos, &kinds).await.unwrap(), 0);
        assert_eq!(ledger.pending(&repos, &kinds).await.unwrap().len(), 4);

        ledger
            .mark_complete(&repos[0], ContentKind::Issues, at(1))
            .await
            .unwrap();
        let pending = ledger.pending(&repos, &kinds).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert!(!pending.contains(&(repos[0].clone(), ContentKind::Issues)));
    }

    #[tokio::test]
    async fn marking_twice_overwrites_the_timestamp() {
        let ledger = MemoryLedger::new();
        let one = repo("a/one");
        ledger.mark_complete(&one, ContentKind::Issues, at(1)).await.unwrap();
        ledger.mark_complete(&one, ContentKind::Issues, at(2)).await.unwrap();

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].completed_at, Some(at(2)));
    }

    #[tokio::test]
    async fn unregistered_pairs_are_pending() {
        let ledger = MemoryLedger::new();
        let pending = ledger
            .pending(&[repo("a/one")], &[ContentKind::Commits])
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn history_has_one_row_per_repository() {
        let entries = vec![
            LedgerEntry {
                entity_id: repo("a/one"),
                content_kind: ContentKind::Issues,
                completed_at: Some(at(5)),
            },
            LedgerEntry {
                entity_id: repo("a/one"),
                content_kind: ContentKind::Releases,
                completed_at: None,
            },
            LedgerEntry {
                entity_id: repo("b/two"),
                content_kind: ContentKind::Releases,
                completed_at: Some(at(6)),
            },
        ];

        assert_eq!(
            render_history(&entries, &[ContentKind::Issues, ContentKind::Releases]),
            "repository,Issues,Releases\n\
             a/one,2024-03-01T05:00:00Z,\n\
             b/two,,2024-03-01T06:00:00Z\n"
        );
    }
}
