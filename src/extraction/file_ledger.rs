// src/extraction/file_ledger.rs
//! Ledger persisted as one JSON document per key.
//!
//! Each update goes to a fresh temporary file that is synced and renamed
//! over the key's document, so a key is always either at its previous state
//! or at its new one, and writers to different keys never touch the same
//! file.

use super::ledger::{pending_from, sorted_entries, ExtractionLedger, LedgerEntry, WorkItem};
use crate::error::AppError;
use crate::types::{ContentKind, RepoFullName};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

const KEY_SEPARATOR: char = '~';
const TEMP_MARKER: &str = ".tmp";

pub struct FileLedger {
    dir: PathBuf,
    index: DashMap<WorkItem, Option<DateTime<Utc>>>,
    write_seq: AtomicU64,
}

impl FileLedger {
    /// Opens (creating if needed) the ledger stored in `dir` and loads its index.
    ///
    /// Unreadable documents are skipped with a warning: their pairs simply
    /// show up as pending again. Temporary files left by an interrupted
    /// write are removed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let index = DashMap::new();
        let mut listing = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = listing.next_entry().await? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if file_name.ends_with(TEMP_MARKER) {
                log::debug!("Removing interrupted ledger write {}", path.display());
                let _ = tokio::fs::remove_file(&path).await;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match read_entry(&path).await {
                Ok(entry) => {
                    index.insert(entry.key(), entry.completed_at);
                }
                Err(e) => log::warn!("Ignoring unreadable ledger entry {}: {}", path.display(), e),
            }
        }

        log::debug!("Opened ledger at {} with {} entries", dir.display(), index.len());
        Ok(Self {
            dir,
            index,
            write_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, entity: &RepoFullName, kind: ContentKind) -> PathBuf {
        self.dir.join(format!(
            "{owner}{sep}{name}{sep}{kind}.json",
            owner = entity.owner(),
            name = entity.name(),
            kind = kind.as_str(),
            sep = KEY_SEPARATOR
        ))
    }

    async fn write_entry(&self, entry: &LedgerEntry) -> Result<(), AppError> {
        let path = self.path_for(&entry.entity_id, entry.content_kind);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("json.{}{}", seq, TEMP_MARKER));
        let json = serde_json::to_vec_pretty(entry)?;

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(AppError::LedgerWrite {
                entity: entry.entity_id.to_string(),
                kind: entry.content_kind.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

async fn read_entry(path: &Path) -> Result<LedgerEntry, AppError> {
    let content = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&content)?)
}

#[async_trait::async_trait]
impl ExtractionLedger for FileLedger {
    async fn register(
        &self,
        entities: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<usize, AppError> {
        let mut created = 0;
        for entity in entities {
            for &kind in kinds {
                let key = (entity.clone(), kind);
                if self.index.contains_key(&key) {
                    continue;
                }
                self.write_entry(&LedgerEntry {
                    entity_id: entity.clone(),
                    content_kind: kind,
                    completed_at: None,
                })
                .await?;
                // A completion racing this registration must win.
                self.index.entry(key).or_insert(None);
                created += 1;
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
            self.index.get(key).is_some_and(|entry| entry.is_some())
        }))
    }

    async fn mark_complete(
        &self,
        entity: &RepoFullName,
        kind: ContentKind,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.write_entry(&LedgerEntry {
            entity_id: entity.clone(),
            content_kind: kind,
            completed_at: Some(at),
        })
        .await?;
        self.index.insert((entity.clone(), kind), Some(at));
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(sorted_entries(self.index.iter().map(|entry| {
            let (entity_id, content_kind) = entry.key().clone();
            LedgerEntry {
                entity_id,
                content_kind,
                completed_at: *entry.value(),
            }
        })))
    }
}
