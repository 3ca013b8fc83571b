// src/search/governor.rs
//! Quota accounting and admission control for outbound API calls.
//!
//! GitHub meters the search endpoints and the rest of the REST API in two
//! independent pools. Every call reserves a unit from its pool before it is
//! sent and settles the reservation with the server's counters when the
//! response arrives, so concurrent workers never admit more calls than the
//! pool has left above its threshold.

use super::cancel::CancellationSignal;
use super::clock::{Clock, SystemClock};
use crate::api::{GitHubApi, QuotaReport, RateLimitResource};
use crate::constants::{GENERAL_QUOTA_LIMIT, SEARCH_QUOTA_LIMIT, UNSPECIFIED_THROTTLE_WAIT};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// The independently metered quota pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPoolClass {
    /// Everything except search (`core` in GitHub's terms)
    General,
    Search,
}

impl QuotaPoolClass {
    pub const ALL: [QuotaPoolClass; 2] = [QuotaPoolClass::General, QuotaPoolClass::Search];

    /// Maps an `x-ratelimit-resource` value onto a pool.
    pub fn from_resource(resource: &str) -> Option<Self> {
        match resource.trim() {
            "core" => Some(Self::General),
            "search" => Some(Self::Search),
            _ => None,
        }
    }

    pub fn resource_name(self) -> &'static str {
        match self {
            Self::General => "core",
            Self::Search => "search",
        }
    }

    fn default_limit(self) -> u32 {
        match self {
            Self::General => GENERAL_QUOTA_LIMIT,
            Self::Search => SEARCH_QUOTA_LIMIT,
        }
    }
}

impl fmt::Display for QuotaPoolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Search => write!(f, "search"),
        }
    }
}

/// Last known state of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaPool {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl QuotaPool {
    fn full(limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining: limit,
            limit,
            reset_at,
        }
    }

    /// Folds a server report into the pool.
    ///
    /// Reports for a later reset replace the state; reports for the current
    /// window can only lower `remaining`; reports for an earlier window are
    /// stale answers that raced a newer one and are dropped.
    fn merge(&mut self, report: QuotaReport) {
        match report.reset_at.cmp(&self.reset_at) {
            Ordering::Greater => {
                *self = Self {
                    remaining: report.remaining,
                    limit: report.limit,
                    reset_at: report.reset_at,
                }
            }
            Ordering::Equal => {
                self.remaining = self.remaining.min(report.remaining);
                self.limit = report.limit;
            }
            Ordering::Less => {}
        }
    }
}

impl From<QuotaReport> for QuotaPool {
    fn from(report: QuotaReport) -> Self {
        Self {
            remaining: report.remaining,
            limit: report.limit,
            reset_at: report.reset_at,
        }
    }
}

#[derive(Debug)]
struct PoolState {
    pool: QuotaPool,
    in_flight: u32,
}

struct PoolSlot {
    state: Mutex<PoolState>,
    released: Notify,
}

impl PoolSlot {
    fn new(pool: QuotaPool) -> Self {
        Self {
            state: Mutex::new(PoolState { pool, in_flight: 0 }),
            released: Notify::new(),
        }
    }
}

enum Admission {
    Granted,
    /// The pool itself is low; nothing helps but the reset.
    UntilReset(Duration),
    /// The pool is fine but other in-flight calls hold the headroom.
    UntilRelease,
}

/// Admission control over both quota pools.
pub struct RateGovernor {
    general: PoolSlot,
    search: PoolSlot,
    threshold: u32,
    clock: Arc<dyn Clock>,
}

impl RateGovernor {
    /// A governor on real time, assuming full pools until told otherwise.
    pub fn new(threshold: u32) -> Self {
        Self::with_clock(threshold, Arc::new(SystemClock))
    }

    pub fn with_clock(threshold: u32, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            general: PoolSlot::new(QuotaPool::full(QuotaPoolClass::General.default_limit(), now)),
            search: PoolSlot::new(QuotaPool::full(QuotaPoolClass::Search.default_limit(), now)),
            threshold,
            clock,
        }
    }

    /// Overrides the starting state of one pool.
    pub fn with_pool(self, class: QuotaPoolClass, pool: QuotaPool) -> Self {
        self.slot(class).state.lock().pool = pool;
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn slot(&self, class: QuotaPoolClass) -> &PoolSlot {
        match class {
            QuotaPoolClass::General => &self.general,
            QuotaPoolClass::Search => &self.search,
        }
    }

    /// Current view of a pool, for diagnostics.
    pub fn snapshot(&self, class: QuotaPoolClass) -> QuotaPool {
        self.slot(class).state.lock().pool
    }

    /// Seeds both pools from `GET /rate_limit`, which is not itself metered.
    pub async fn prime(&self, api: &dyn GitHubApi) -> Result<(), AppError> {
        let response = api.get_json("rate_limit").await?;
        for class in QuotaPoolClass::ALL {
            let Some(resource) = response
                .body
                .get("resources")
                .and_then(|resources| resources.get(class.resource_name()))
            else {
                continue;
            };
            let resource: RateLimitResource = serde_json::from_value(resource.clone())?;
            if let Some(report) = resource.to_report() {
                self.record_usage(class, report);
                log::debug!(
                    "{} quota primed: {}/{} until {}",
                    class,
                    report.remaining,
                    report.limit,
                    report.reset_at
                );
            }
        }
        Ok(())
    }

    /// Waits until a call against `class` may be sent, then reserves it.
    ///
    /// Never admits a call while the pool's remaining count (less calls
    /// already in flight) is at or below the threshold. A low pool is waited
    /// out in a single sleep until its reset; a reset time already in the
    /// past means the pool is assumed refilled and no wait happens.
    pub async fn await_capacity(
        &self,
        class: QuotaPoolClass,
        cancel: &CancellationSignal,
    ) -> Result<QuotaPermit<'_>, AppError> {
        let slot = self.slot(class);
        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let released = slot.released.notified();
            let admission = self.admit(class, &mut slot.state.lock());

            match admission {
                Admission::Granted => {
                    return Ok(QuotaPermit {
                        governor: self,
                        class,
                        active: true,
                    })
                }
                Admission::UntilReset(wait) => {
                    let pool = self.snapshot(class);
                    log::info!(
                        "{} quota at {}/{} (threshold {}), waiting {:?} until reset at {}",
                        class,
                        pool.remaining,
                        pool.limit,
                        self.threshold,
                        wait,
                        pool.reset_at
                    );
                    cancel.sleep(self.clock.as_ref(), wait).await?;
                }
                Admission::UntilRelease => {
                    log::debug!("{} quota headroom held by in-flight calls, waiting", class);
                    cancel.guard(released).await?;
                }
            }
        }
    }

    fn admit(&self, class: QuotaPoolClass, state: &mut PoolState) -> Admission {
        let now = self.clock.now();
        if now >= state.pool.reset_at && state.pool.remaining < state.pool.limit {
            log::debug!("{} quota window has reset, assuming full limit", class);
            state.pool.remaining = state.pool.limit;
        }

        // A pool smaller than the threshold could never admit anything.
        let floor = self.threshold.min(state.pool.limit.saturating_sub(1));

        if state.pool.remaining <= floor {
            let wait = (state.pool.reset_at - now).to_std().unwrap_or(Duration::ZERO);
            return Admission::UntilReset(wait);
        }
        if state.pool.remaining.saturating_sub(state.in_flight) <= floor {
            return Admission::UntilRelease;
        }
        state.in_flight += 1;
        Admission::Granted
    }

    /// Updates a pool from a server report outside of any reservation.
    pub fn record_usage(&self, class: QuotaPoolClass, report: QuotaReport) {
        self.slot(class).state.lock().pool.merge(report);
    }

    /// Records that the server refused a call for lack of quota.
    ///
    /// The pool is marked empty until the reported reset. A reported reset
    /// already in the past means the window has rolled over, so the next
    /// admission refills the pool and tries again at once. Without any report
    /// the wait falls back to `retry-after`, or to a fixed pause, so a
    /// refused call is never retried in a hot loop.
    pub fn record_throttle(
        &self,
        class: QuotaPoolClass,
        report: Option<QuotaReport>,
        retry_after: Option<Duration>,
    ) {
        let now = self.clock.now();
        let after = |wait: Duration| {
            now + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::minutes(1))
        };
        let reset_at = match (report.map(|r| r.reset_at), retry_after) {
            (Some(reset), Some(wait)) => reset.max(after(wait)),
            (Some(reset), None) => reset.max(now),
            (None, Some(wait)) => after(wait),
            (None, None) => after(UNSPECIFIED_THROTTLE_WAIT),
        };

        let mut state = self.slot(class).state.lock();
        state.pool.remaining = 0;
        match report {
            // The refusal's own report is the newest word on the window.
            Some(report) => {
                state.pool.limit = report.limit;
                state.pool.reset_at = reset_at;
            }
            None => state.pool.reset_at = state.pool.reset_at.max(reset_at),
        }
        log::warn!(
            "{} quota refused by the service, blocked until {}",
            class,
            state.pool.reset_at
        );
    }

    fn release(&self, class: QuotaPoolClass, settled: Option<Option<QuotaReport>>) {
        let slot = self.slot(class);
        {
            let mut state = slot.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            match settled {
                Some(Some(report)) => state.pool.merge(report),
                Some(None) => state.pool.remaining = state.pool.remaining.saturating_sub(1),
                None => {}
            }
        }
        slot.released.notify_waiters();
    }
}

/// A reserved unit of quota.
///
/// Settle it with the response's report; dropping it unsettled (failed or
/// cancelled call) just returns the reservation.
#[must_use = "a permit holds a quota reservation until settled or dropped"]
pub struct QuotaPermit<'a> {
    governor: &'a RateGovernor,
    class: QuotaPoolClass,
    active: bool,
}

impl QuotaPermit<'_> {
    pub fn class(&self) -> QuotaPoolClass {
        self.class
    }

    /// Completes the reservation. Without a report, one unit is deducted locally.
    pub fn settle(mut self, report: Option<QuotaReport>) {
        self.active = false;
        self.governor.release(self.class, Some(report));
    }
}

impl Drop for QuotaPermit<'_> {
    fn drop(&mut self) {
        if self.active {
            self.governor.release(self.class, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::clock::ManualClock;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn report(remaining: u32, limit: u32, reset_in_secs: i64) -> QuotaReport {
        QuotaReport {
            remaining,
            limit,
            reset_at: start() + chrono::Duration::seconds(reset_in_secs),
        }
    }

    #[test]
    fn merge_keeps_the_lowest_count_within_a_window() {
        let mut pool = QuotaPool::from(report(20, 30, 60));
        pool.merge(report(25, 30, 60));
        assert_eq!(pool.remaining, 20);
        pool.merge(report(18, 30, 60));
        assert_eq!(pool.remaining, 18);
        pool.merge(report(30, 30, 120));
        assert_eq!(pool.remaining, 30);
        pool.merge(report(2, 30, 60));
        assert_eq!(pool.remaining, 30, "stale window must be ignored");
    }

    #[tokio::test]
    async fn settled_permits_apply_server_counters() {
        let clock = Arc::new(ManualClock::new(start()));
        let governor = RateGovernor::with_clock(10, clock);
        let cancel = CancellationSignal::new();

        let permit = governor
            .await_capacity(QuotaPoolClass::Search, &cancel)
            .await
            .unwrap();
        permit.settle(Some(report(29, 30, 60)));

        assert_eq!(governor.snapshot(QuotaPoolClass::Search).remaining, 29);
        assert_eq!(governor.snapshot(QuotaPoolClass::General).remaining, 5000);
    }

    #[tokio::test]
    async fn unsettled_permits_return_their_reservation() {
        let clock = Arc::new(ManualClock::new(start()));
        let governor = RateGovernor::with_clock(10, clock)
            .with_pool(QuotaPoolClass::Search, QuotaPool::from(report(11, 30, 60)));
        let cancel = CancellationSignal::new();

        let permit = governor
            .await_capacity(QuotaPoolClass::Search, &cancel)
            .await
            .unwrap();
        drop(permit);
        let permit = governor
            .await_capacity(QuotaPoolClass::Search, &cancel)
            .await
            .unwrap();
        permit.settle(None);
        assert_eq!(governor.snapshot(QuotaPoolClass::Search).remaining, 10);
    }

    #[test]
    fn throttle_without_reset_still_blocks() {
        let clock = Arc::new(ManualClock::new(start()));
        let governor = RateGovernor::with_clock(10, clock);
        governor.record_throttle(QuotaPoolClass::Search, None, None);
        let pool = governor.snapshot(QuotaPoolClass::Search);
        assert_eq!(pool.remaining, 0);
        assert_eq!(pool.reset_at, start() + chrono::Duration::seconds(60));

        governor.record_throttle(
            QuotaPoolClass::General,
            None,
            Some(Duration::from_secs(5)),
        );
        assert_eq!(
            governor.snapshot(QuotaPoolClass::General).reset_at,
            start() + chrono::Duration::seconds(5)
        );
    }

    #[test]
    fn resource_names_map_to_pools() {
        assert_eq!(QuotaPoolClass::from_resource("core"), Some(QuotaPoolClass::General));
        assert_eq!(QuotaPoolClass::from_resource("search"), Some(QuotaPoolClass::Search));
        assert_eq!(QuotaPoolClass::from_resource("graphql"), None);
    }
}
