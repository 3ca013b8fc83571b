// tests/resumable_harvest.rs
//! Resuming bulk extraction from the file-backed ledger.

use async_trait::async_trait;
use github_harvest::{
    render_history, AppError, CancellationSignal, ContentExtractor, ContentKind,
    ExtractionLedger, ExtractionStats, FileLedger, GitHubErrorCode, HarvestRunner, RepoFullName,
    WorkItem,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Records every extraction; can fail one pair or cancel after a number of calls.
#[derive(Default)]
struct RecordingExtractor {
    calls: Mutex<Vec<WorkItem>>,
    failing: Option<WorkItem>,
    cancel_after: Option<(usize, CancellationSignal)>,
}

impl RecordingExtractor {
    fn calls(&self) -> Vec<WorkItem> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContentExtractor for RecordingExtractor {
    async fn extract(
        &self,
        repo: &RepoFullName,
        kind: ContentKind,
        dest: &Path,
    ) -> Result<ExtractionStats, AppError> {
        tokio::task::yield_now().await;
        let made = {
            let mut calls = self.calls.lock();
            calls.push((repo.clone(), kind));
            calls.len()
        };
        if let Some((after, signal)) = &self.cancel_after {
            if made == *after {
                signal.cancel();
            }
        }
        if self.failing.as_ref() == Some(&(repo.clone(), kind)) {
            return Err(AppError::GitHubService {
                code: GitHubErrorCode::Forbidden,
                message: "Resource not accessible".to_string(),
                status: 403,
            });
        }
        assert!(dest.ends_with(Path::new(repo.owner()).join(repo.name())));
        Ok(ExtractionStats {
            records: 3,
            pages: 1,
        })
    }
}

fn repos(names: &[&str]) -> Vec<RepoFullName> {
    names.iter().map(|n| RepoFullName::parse(n).unwrap()).collect()
}

const KINDS: [ContentKind; 2] = [ContentKind::Issues, ContentKind::Releases];

async fn runner(
    dir: &Path,
    extractor: Arc<RecordingExtractor>,
    cancel: CancellationSignal,
    workers: usize,
) -> HarvestRunner {
    let ledger = Arc::new(FileLedger::open(dir.join(".ledger")).await.unwrap());
    HarvestRunner::new(ledger, extractor, dir, cancel).with_workers(workers)
}

#[tokio::test]
async fn completed_run_is_not_repeated() {
    let dir = tempfile::tempdir().unwrap();
    let scope = repos(&["octo/one", "octo/two", "rust-lang/rust"]);

    let first = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), first.clone(), CancellationSignal::new(), 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert_eq!(report.scope, 6);
    assert_eq!(report.extracted, 6);
    assert_eq!(report.records, 18);
    assert!(!report.interrupted);

    // Kind-major order: every repository's issues before any releases.
    let kinds: Vec<ContentKind> = first.calls().into_iter().map(|(_, kind)| kind).collect();
    assert_eq!(
        kinds,
        vec![
            ContentKind::Issues,
            ContentKind::Issues,
            ContentKind::Issues,
            ContentKind::Releases,
            ContentKind::Releases,
            ContentKind::Releases,
        ]
    );

    let second = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), second.clone(), CancellationSignal::new(), 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert_eq!(report.skipped, 6);
    assert_eq!(report.extracted, 0);
    assert!(second.calls().is_empty());
}

#[tokio::test]
async fn interrupted_run_resumes_with_only_unfinished_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let scope = repos(&["a/one", "b/two", "c/three"]);

    let cancel = CancellationSignal::new();
    let first = Arc::new(RecordingExtractor {
        cancel_after: Some((2, cancel.clone())),
        ..RecordingExtractor::default()
    });
    let report = runner(dir.path(), first.clone(), cancel, 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert!(report.interrupted);
    assert_eq!(report.extracted, 2);
    let done: HashSet<WorkItem> = first.calls().into_iter().collect();

    let second = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), second.clone(), CancellationSignal::new(), 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.extracted, 4);
    let resumed: HashSet<WorkItem> = second.calls().into_iter().collect();
    assert_eq!(resumed.len(), 4);
    assert!(resumed.is_disjoint(&done));
}

#[tokio::test]
async fn failed_pair_stays_pending_for_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let scope = repos(&["a/one", "b/two"]);
    let broken = (RepoFullName::parse("b/two").unwrap(), ContentKind::Releases);

    let first = Arc::new(RecordingExtractor {
        failing: Some(broken.clone()),
        ..RecordingExtractor::default()
    });
    let report = runner(dir.path(), first, CancellationSignal::new(), 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert_eq!(report.extracted, 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity, broken.0);
    assert_eq!(report.failed[0].kind, broken.1);

    let second = Arc::new(RecordingExtractor::default());
    runner(dir.path(), second.clone(), CancellationSignal::new(), 1)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();
    assert_eq!(second.calls(), vec![broken]);
}

#[tokio::test]
async fn concurrent_workers_extract_each_pair_once() {
    let dir = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..10).map(|i| format!("org/repo-{}", i)).collect();
    let scope: Vec<RepoFullName> = names
        .iter()
        .map(|n| RepoFullName::parse(n).unwrap())
        .collect();

    let extractor = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), extractor.clone(), CancellationSignal::new(), 4)
        .await
        .run(&scope, &KINDS)
        .await
        .unwrap();

    assert_eq!(report.extracted, 20);
    let calls = extractor.calls();
    let distinct: HashSet<&WorkItem> = calls.iter().collect();
    assert_eq!(calls.len(), 20);
    assert_eq!(distinct.len(), 20);

    let ledger = FileLedger::open(dir.path().join(".ledger")).await.unwrap();
    assert!(ledger.pending(&scope, &KINDS).await.unwrap().is_empty());
}

#[tokio::test]
async fn widened_scope_only_adds_new_work() {
    let dir = tempfile::tempdir().unwrap();
    let first_scope = repos(&["a/one"]);

    let first = Arc::new(RecordingExtractor::default());
    runner(dir.path(), first, CancellationSignal::new(), 1)
        .await
        .run(&first_scope, &[ContentKind::Issues])
        .await
        .unwrap();

    let wider = repos(&["a/one", "b/two"]);
    let second = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), second.clone(), CancellationSignal::new(), 1)
        .await
        .run(&wider, &KINDS)
        .await
        .unwrap();

    assert_eq!(report.scope, 4);
    assert_eq!(report.skipped, 1);
    assert_eq!(second.calls().len(), 3);
    assert!(!second
        .calls()
        .contains(&(RepoFullName::parse("a/one").unwrap(), ContentKind::Issues)));
}

#[tokio::test]
async fn survey_records_scope_without_extracting() {
    let dir = tempfile::tempdir().unwrap();
    let scope = repos(&["a/one", "b/two"]);

    let extractor = Arc::new(RecordingExtractor::default());
    let report = runner(dir.path(), extractor.clone(), CancellationSignal::new(), 1)
        .await
        .survey(&scope, &KINDS)
        .await
        .unwrap();

    assert_eq!(report.scope, 4);
    assert_eq!(report.skipped, 0);
    assert!(extractor.calls().is_empty());

    let ledger = FileLedger::open(dir.path().join(".ledger")).await.unwrap();
    let entries = ledger.entries().await.unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(
        render_history(&entries, &KINDS),
        "repository,Issues,Releases\na/one,,\nb/two,,\n"
    );
}
