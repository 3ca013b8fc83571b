// tests/support/mod.rs
//! Shared fixtures: an in-memory search service, corpus builders and
//! checks on the windows an enumeration produces.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use github_harvest::{
    AppError, CancellationSignal, Clock, GitHubErrorCode, LeafWindow, ManualClock,
    PartitionConfig, QuotaPoolClass, QuotaReport, RateGovernor, SearchItem, SearchPage,
    SearchRequest, SearchService, SearchSession, Window, WindowPartitioner,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
}

/// A search result reduced to what enumeration looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

impl SearchItem for Repo {
    type Identity = u64;

    fn identity(&self) -> u64 {
        self.id
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Incrementally builds a corpus with unique ids.
#[derive(Debug, Default)]
pub struct Corpus {
    items: Vec<Repo>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, created_at: DateTime<Utc>) -> Self {
        let id = self.items.len() as u64 + 1;
        self.items.push(Repo { id, created_at });
        self
    }

    /// `per_day` items evenly spaced over each of `days` days from `start`.
    pub fn uniform(mut self, start: DateTime<Utc>, days: i64, per_day: i64) -> Self {
        for day in 0..days {
            for i in 0..per_day {
                let offset = day * 86_400 + i * 86_400 / per_day;
                self = self.push(start + ChronoDuration::seconds(offset));
            }
        }
        self
    }

    /// `count` items evenly spread over `span_secs` seconds from `start`.
    pub fn burst(mut self, start: DateTime<Utc>, span_secs: i64, count: i64) -> Self {
        for i in 0..count {
            self = self.push(start + ChronoDuration::seconds(i * span_secs / count));
        }
        self
    }

    /// `count` items created within the very same second.
    pub fn same_second(mut self, at: DateTime<Utc>, count: usize) -> Self {
        for _ in 0..count {
            self = self.push(at);
        }
        self
    }

    pub fn build(self) -> Vec<Repo> {
        self.items
    }
}

/// A quota enforced the way the service does: a fixed budget per period,
/// refusing calls once it is spent.
#[derive(Debug)]
struct ServerQuota {
    limit: u32,
    period: ChronoDuration,
    remaining: u32,
    reset_at: DateTime<Utc>,
}

impl ServerQuota {
    fn report(&self) -> QuotaReport {
        QuotaReport {
            remaining: self.remaining,
            limit: self.limit,
            reset_at: self.reset_at,
        }
    }
}

/// An in-memory search service over a fixed corpus.
///
/// Like the real one, it reports the full match count of a window but
/// serves no result past the cap.
pub struct StubSearch<T> {
    corpus: Vec<T>,
    cap: usize,
    calls: AtomicU32,
    requests: Mutex<Vec<SearchRequest>>,
    transient_failures: AtomicU32,
    incomplete_pages: AtomicU32,
    fail_from_call: Option<u32>,
    repeat_page_boundary: bool,
    quota: Option<(Arc<dyn Clock>, Mutex<ServerQuota>)>,
    refusals: AtomicU32,
    cancel_at: Option<(u32, CancellationSignal)>,
}

impl<T: SearchItem> StubSearch<T> {
    pub fn new(mut corpus: Vec<T>) -> Self {
        corpus.sort_by_key(|item| item.sort_key());
        Self {
            corpus,
            cap: 1000,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            transient_failures: AtomicU32::new(0),
            incomplete_pages: AtomicU32::new(0),
            fail_from_call: None,
            repeat_page_boundary: false,
            quota: None,
            refusals: AtomicU32::new(0),
            cancel_at: None,
        }
    }

    /// Serves at most `cap` results per query instead of 1000.
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// The next `count` calls fail with a 503.
    pub fn fail_transiently(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` calls time out server-side: they are charged and
    /// answer with a third of the true count and at most ten items.
    pub fn incomplete_pages(self, count: u32) -> Self {
        self.incomplete_pages.store(count, Ordering::SeqCst);
        self
    }

    /// Every call from the `call`-th on (1-based) fails with a 422.
    pub fn fail_from_call(mut self, call: u32) -> Self {
        self.fail_from_call = Some(call);
        self
    }

    /// Pages after the first also repeat the last item of the page before,
    /// as happens when the index shifts between page requests.
    pub fn repeat_page_boundary(mut self) -> Self {
        self.repeat_page_boundary = true;
        self
    }

    /// Enforces `limit` calls per `period_secs`, timed by `clock`.
    pub fn with_quota(mut self, clock: Arc<dyn Clock>, limit: u32, period_secs: i64) -> Self {
        let period = ChronoDuration::seconds(period_secs);
        let quota = ServerQuota {
            limit,
            period,
            remaining: limit,
            reset_at: clock.now() + period,
        };
        self.quota = Some((clock, Mutex::new(quota)));
        self
    }

    /// Cancels `signal` while serving the `call`-th call.
    pub fn cancel_at(mut self, call: u32, signal: CancellationSignal) -> Self {
        self.cancel_at = Some((call, signal));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refusals(&self) -> u32 {
        self.refusals.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }

    pub fn corpus(&self) -> &[T] {
        &self.corpus
    }

    /// How many corpus items fall in `window`.
    pub fn count_in(&self, window: &Window) -> usize {
        self.corpus
            .iter()
            .filter(|item| window.contains(item.sort_key()))
            .count()
    }

    fn charge(&self) -> Result<Option<QuotaReport>, AppError> {
        let Some((clock, quota)) = &self.quota else {
            return Ok(None);
        };
        let now = clock.now();
        let mut quota = quota.lock();
        if now >= quota.reset_at {
            quota.remaining = quota.limit;
            quota.reset_at = now + quota.period;
        }
        if quota.remaining == 0 {
            self.refusals.fetch_add(1, Ordering::SeqCst);
            return Err(AppError::RateLimited {
                pool: QuotaPoolClass::Search,
                quota: Some(quota.report()),
                retry_after: None,
            });
        }
        quota.remaining -= 1;
        Ok(Some(quota.report()))
    }
}

#[async_trait]
impl<T: SearchItem> SearchService for StubSearch<T> {
    type Item = T;

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage<T>, AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().push(request.clone());
        tokio::task::yield_now().await;

        if let Some((at, signal)) = &self.cancel_at {
            if call == *at {
                signal.cancel();
            }
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::GitHubService {
                code: GitHubErrorCode::ServiceUnavailable,
                message: "stub outage".to_string(),
                status: 503,
            });
        }
        if self.fail_from_call.is_some_and(|from| call >= from) {
            return Err(AppError::GitHubService {
                code: GitHubErrorCode::ValidationFailed,
                message: "stub rejects the query".to_string(),
                status: 422,
            });
        }
        let quota = self.charge()?;

        let matching: Vec<&T> = self
            .corpus
            .iter()
            .filter(|item| request.window.contains(item.sort_key()))
            .collect();
        let per_page = request.per_page as usize;
        let start = (request.page.max(1) as usize - 1) * per_page;
        let end = (start + per_page).min(matching.len()).min(self.cap);

        if self
            .incomplete_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let items = matching.iter().take(10).map(|item| (*item).clone()).collect();
            return Ok(SearchPage {
                total_count: matching.len() as u64 / 3,
                incomplete_results: true,
                items,
                quota,
            });
        }

        let mut items: Vec<T> = if start < end {
            matching[start..end].iter().map(|item| (*item).clone()).collect()
        } else {
            Vec::new()
        };
        if self.repeat_page_boundary && start > 0 && start < end {
            items.insert(0, matching[start - 1].clone());
        }

        Ok(SearchPage {
            total_count: matching.len() as u64,
            incomplete_results: false,
            items,
            quota,
        })
    }
}

pub fn manual_clock(start: DateTime<Utc>) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start))
}

pub fn governor(clock: Arc<ManualClock>, threshold: u32) -> Arc<RateGovernor> {
    Arc::new(RateGovernor::with_clock(threshold, clock))
}

pub fn partitioner<T: SearchItem>(
    stub: Arc<StubSearch<T>>,
    governor: Arc<RateGovernor>,
    cancel: CancellationSignal,
    workers: usize,
    config: PartitionConfig,
) -> WindowPartitioner<StubSearch<T>> {
    let session = SearchSession::new(stub, governor, cancel).with_workers(workers);
    WindowPartitioner::new(session, config).unwrap()
}

/// Leaves must tile `bounding` exactly, left to right.
pub fn assert_tiles(bounding: Window, leaves: &[LeafWindow]) {
    assert!(!leaves.is_empty(), "no leaves");
    assert_eq!(leaves[0].window.start(), bounding.start());
    assert_eq!(leaves[leaves.len() - 1].window.end(), bounding.end());
    for pair in leaves.windows(2) {
        assert_eq!(
            pair[0].window.end(),
            pair[1].window.start(),
            "gap or overlap between {} and {}",
            pair[0].window,
            pair[1].window
        );
    }
}

pub fn ids<T: SearchItem<Identity = u64>>(items: &[T]) -> Vec<u64> {
    items.iter().map(SearchItem::identity).collect()
}
