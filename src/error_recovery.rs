// src/error_recovery.rs
//! Retry with exponential backoff for API operations.

use crate::api::ReportsQuota;
use crate::constants::{DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF};
use crate::error::AppError;
use crate::search::{CancellationSignal, QuotaPoolClass, RateGovernor};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry schedule for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-based), with up to 25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        let jitter_cap = (base.as_millis() / 4) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Runs one API call under quota admission, retrying what can be retried.
///
/// Each attempt first reserves capacity in `pool`. A rate-limit refusal is
/// not counted as a failed attempt: it is recorded on the governor, whose
/// next admission waits out the reset. Transient failures are retried up to
/// the policy's bound; everything else returns immediately. Cancellation
/// interrupts quota waits, backoff sleeps and the call itself.
pub async fn governed_call<T, F, Fut>(
    governor: &RateGovernor,
    pool: QuotaPoolClass,
    cancel: &CancellationSignal,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, AppError>
where
    T: ReportsQuota,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut failures = 0u32;

    loop {
        let permit = governor.await_capacity(pool, cancel).await?;

        match cancel.guard(operation()).await? {
            Ok(output) => {
                permit.settle(output.quota());
                return Ok(output);
            }
            Err(AppError::RateLimited {
                pool: limited,
                quota,
                retry_after,
            }) => {
                drop(permit);
                governor.record_throttle(limited, quota, retry_after);
            }
            Err(e) if e.is_transient() && failures + 1 < policy.max_attempts => {
                drop(permit);
                failures += 1;
                let delay = policy.delay_for(failures);
                log::warn!(
                    "Attempt {} failed ({}), retrying after {:?}",
                    failures,
                    e,
                    delay
                );
                cancel.sleep(governor.clock(), delay).await?;
            }
            Err(e) => return Err(e),
        }
    }
}
