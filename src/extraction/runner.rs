// src/extraction/runner.rs
//! The resumable extraction driver.

use super::ledger::{ExtractionLedger, WorkItem};
use super::ContentExtractor;
use crate::constants::LEDGER_WRITE_ATTEMPTS;
use crate::error::AppError;
use crate::error_recovery::RetryPolicy;
use crate::search::{CancellationSignal, Clock, SystemClock};
use crate::types::{ContentKind, RepoFullName};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedExtraction {
    pub entity: RepoFullName,
    pub kind: ContentKind,
    pub reason: String,
}

/// What a harvest run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Pairs in scope (`repositories x kinds`)
    pub scope: usize,
    /// Pairs already complete from earlier runs
    pub skipped: usize,
    pub extracted: usize,
    pub records: usize,
    pub failed: Vec<FailedExtraction>,
    /// Extracted, but the completion mark could not be written
    pub unrecorded: usize,
    pub interrupted: bool,
}

impl HarvestReport {
    fn absorb(&mut self, tally: HarvestReport) {
        self.extracted += tally.extracted;
        self.records += tally.records;
        self.failed.extend(tally.failed);
        self.unrecorded += tally.unrecorded;
        self.interrupted |= tally.interrupted;
    }
}

/// Runs every pending `(repository, kind)` extraction and records each
/// completion in the ledger as soon as it happens.
///
/// Work is ordered kind-major (all repositories for one kind, then the
/// next kind) and shared by a fixed number of workers.
pub struct HarvestRunner {
    ledger: Arc<dyn ExtractionLedger>,
    extractor: Arc<dyn ContentExtractor>,
    project_dir: PathBuf,
    cancel: CancellationSignal,
    clock: Arc<dyn Clock>,
    workers: usize,
}

impl HarvestRunner {
    pub fn new(
        ledger: Arc<dyn ExtractionLedger>,
        extractor: Arc<dyn ContentExtractor>,
        project_dir: impl Into<PathBuf>,
        cancel: CancellationSignal,
    ) -> Self {
        Self {
            ledger,
            extractor,
            project_dir: project_dir.into(),
            cancel,
            clock: Arc::new(SystemClock),
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers the scope and reports what a run would do, extracting nothing.
    pub async fn survey(
        &self,
        repos: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<HarvestReport, AppError> {
        let (report, _) = self.prepare(repos, kinds).await?;
        Ok(report)
    }

    async fn prepare(
        &self,
        repos: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<(HarvestReport, Vec<WorkItem>), AppError> {
        let repos: Vec<RepoFullName> = distinct(repos.iter().cloned());
        let kinds: Vec<ContentKind> = distinct(kinds.iter().copied());

        let created = self.ledger.register(&repos, &kinds).await?;
        let pending = self.ledger.pending(&repos, &kinds).await?;

        let report = HarvestReport {
            scope: repos.len() * kinds.len(),
            skipped: repos.len() * kinds.len() - pending.len(),
            ..HarvestReport::default()
        };
        log::info!(
            "Harvest scope: {} pairs ({} newly registered), {} already complete, {} pending",
            report.scope,
            created,
            report.skipped,
            pending.len()
        );

        let mut queue: Vec<WorkItem> = pending.into_iter().collect();
        queue.sort_by(|(repo_a, kind_a), (repo_b, kind_b)| {
            kind_a.cmp(kind_b).then_with(|| repo_a.cmp(repo_b))
        });
        Ok((report, queue))
    }

    pub async fn run(
        &self,
        repos: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<HarvestReport, AppError> {
        let (mut report, queue) = self.prepare(repos, kinds).await?;
        let queue = Arc::new(Mutex::new(VecDeque::from(queue)));

        let mut join_set = JoinSet::new();
        for _ in 0..self.workers {
            let worker = Worker {
                ledger: Arc::clone(&self.ledger),
                extractor: Arc::clone(&self.extractor),
                project_dir: self.project_dir.clone(),
                cancel: self.cancel.clone(),
                clock: Arc::clone(&self.clock),
                queue: Arc::clone(&queue),
            };
            join_set.spawn(async move { worker.run().await });
        }

        while let Some(result) = join_set.join_next().await {
            let tally = result.map_err(|e| AppError::InternalError {
                message: format!("Extraction worker task failed with join error: {}", e),
                source: None,
            })?;
            report.absorb(tally);
        }

        if self.cancel.is_cancelled() {
            report.interrupted = true;
        }
        log::info!(
            "Harvest {}: {} extracted ({} records), {} failed, {} unrecorded",
            if report.interrupted { "interrupted" } else { "finished" },
            report.extracted,
            report.records,
            report.failed.len(),
            report.unrecorded
        );
        Ok(report)
    }
}

fn distinct<T: std::hash::Hash + Eq>(items: impl Iterator<Item = T>) -> Vec<T> {
    items.collect::<IndexSet<T>>().into_iter().collect()
}

struct Worker {
    ledger: Arc<dyn ExtractionLedger>,
    extractor: Arc<dyn ContentExtractor>,
    project_dir: PathBuf,
    cancel: CancellationSignal,
    clock: Arc<dyn Clock>,
    queue: Arc<Mutex<VecDeque<WorkItem>>>,
}

impl Worker {
    async fn run(self) -> HarvestReport {
        let mut tally = HarvestReport::default();

        loop {
            if self.cancel.is_cancelled() {
                tally.interrupted = true;
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some((repo, kind)) = next else {
                break;
            };

            let dest = self.project_dir.join(repo.owner()).join(repo.name());
            match self.extractor.extract(&repo, kind, &dest).await {
                Ok(stats) => {
                    tally.extracted += 1;
                    tally.records += stats.records;
                    if !self.record(&repo, kind).await {
                        tally.unrecorded += 1;
                    }
                }
                Err(AppError::Cancelled) => {
                    tally.interrupted = true;
                    break;
                }
                Err(e) => {
                    log::error!("Extracting {} of {} failed: {}", kind, repo, e);
                    tally.failed.push(FailedExtraction {
                        entity: repo,
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }
        tally
    }

    /// Marks the pair complete, retrying failed writes. A mark that cannot be
    /// written only costs a repeated extraction on the next run.
    async fn record(&self, repo: &RepoFullName, kind: ContentKind) -> bool {
        let backoff = RetryPolicy::default();
        for attempt in 1..=LEDGER_WRITE_ATTEMPTS {
            match self.ledger.mark_complete(repo, kind, self.clock.now()).await {
                Ok(()) => return true,
                Err(e) if attempt < LEDGER_WRITE_ATTEMPTS => {
                    log::warn!(
                        "Recording {} of {} failed (attempt {}/{}): {}",
                        kind,
                        repo,
                        attempt,
                        LEDGER_WRITE_ATTEMPTS,
                        e
                    );
                    // Finish the bookkeeping even when cancelled; only skip the pause.
                    let _ = self
                        .cancel
                        .sleep(self.clock.as_ref(), backoff.delay_for(attempt))
                        .await;
                }
                Err(e) => {
                    log::error!(
                        "Giving up recording {} of {}; it will be extracted again next run: {}",
                        kind,
                        repo,
                        e
                    );
                }
            }
        }
        false
    }
}
