// src/extraction/mod.rs
//! Bulk extraction of repository content, resumable through the ledger.

mod file_ledger;
mod github;
mod ledger;
mod runner;

pub use file_ledger::FileLedger;
pub use github::GitHubContentExtractor;
pub use ledger::{render_history, ExtractionLedger, LedgerEntry, MemoryLedger, WorkItem};
pub use runner::{FailedExtraction, HarvestReport, HarvestRunner};

use crate::error::AppError;
use crate::types::{ContentKind, RepoFullName};
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub records: usize,
    pub pages: u32,
}

/// The ability to fetch one kind of content for one repository into `dest`.
///
/// An extraction either completes or fails as a whole; whatever it wrote
/// before failing is overwritten by the next attempt.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        repo: &RepoFullName,
        kind: ContentKind,
        dest: &Path,
    ) -> Result<ExtractionStats, AppError>;
}
