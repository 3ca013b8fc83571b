// src/search/mod.rs
//! Exhaustive enumeration of a capped search.
//!
//! The search service answers at most a fixed number of results per query.
//! [`WindowPartitioner`] splits the created-date axis into windows that each
//! fit under that cap, [`ResultCollector`] pages through each window, and
//! every call goes through the [`RateGovernor`] so quota is spent without
//! ever being refused.

mod cancel;
mod clock;
mod collector;
mod governor;
mod partitioner;

pub use cancel::CancellationSignal;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::ResultCollector;
pub use governor::{QuotaPermit, QuotaPool, QuotaPoolClass, RateGovernor};
pub use partitioner::{
    Enumeration, EnumerationError, ExhaustionPolicy, LeafWindow, PartitionConfig,
    WindowPartitioner,
};

use crate::api::{SearchPage, SearchRequest, SearchService};
use crate::constants::SEARCH_PAGE_SIZE;
use crate::error::{AppError, GitHubErrorCode};
use crate::error_recovery::{governed_call, RetryPolicy};
use crate::types::{SearchFilter, Window};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything a search call needs: the service, quota admission,
/// cancellation, retry policy and the bound on concurrent calls.
pub struct SearchSession<S> {
    service: Arc<S>,
    governor: Arc<RateGovernor>,
    cancel: CancellationSignal,
    retry: RetryPolicy,
    slots: Arc<Semaphore>,
    workers: usize,
    page_size: u32,
}

impl<S: SearchService> SearchSession<S> {
    pub fn new(service: Arc<S>, governor: Arc<RateGovernor>, cancel: CancellationSignal) -> Self {
        Self {
            service,
            governor,
            cancel,
            retry: RetryPolicy::default(),
            slots: Arc::new(Semaphore::new(1)),
            workers: 1,
            page_size: SEARCH_PAGE_SIZE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Allows up to `workers` search calls in flight at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        let workers = workers.max(1);
        self.workers = workers;
        self.slots = Arc::new(Semaphore::new(workers));
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn cancel(&self) -> &CancellationSignal {
        &self.cancel
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Builds the request for one page of `filter` restricted to `window`.
    pub fn request(&self, filter: &SearchFilter, window: Window, page: u32) -> SearchRequest {
        SearchRequest::new(filter.query_expression(&window), window, page, self.page_size)
    }

    /// Sends one search call through the worker slots and the search pool.
    pub async fn fetch(&self, request: &SearchRequest) -> Result<SearchPage<S::Item>, AppError> {
        let _slot = self
            .cancel
            .guard(self.slots.acquire())
            .await?
            .map_err(|e| AppError::InternalError {
                message: format!("search worker pool closed: {}", e),
                source: None,
            })?;

        let service = self.service.as_ref();
        let governor = self.governor.as_ref();
        governed_call(
            &self.governor,
            QuotaPoolClass::Search,
            &self.cancel,
            &self.retry,
            move || async move { complete(governor, request, service.search(request).await?) },
        )
        .await
    }
}

/// Rejects a page the service marked incomplete.
///
/// Its `total_count` may understate the window and its items may stop
/// short, so it must neither drive a split decision nor fill a leaf. The
/// call is retried like any other transient failure; its quota report is
/// still applied because the call was charged.
fn complete<T>(
    governor: &RateGovernor,
    request: &SearchRequest,
    page: SearchPage<T>,
) -> Result<SearchPage<T>, AppError> {
    if !page.incomplete_results {
        return Ok(page);
    }
    if let Some(report) = page.quota {
        governor.record_usage(QuotaPoolClass::Search, report);
    }
    Err(AppError::GitHubService {
        code: GitHubErrorCode::IncompleteResults,
        message: format!(
            "search timed out server-side for {} page {} ({} results reported)",
            request.window, request.page, page.total_count
        ),
        status: 200,
    })
}
