// src/search/cancel.rs
//! Cooperative cancellation shared by every long-running operation.

use super::clock::Clock;
use crate::error::AppError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A one-way, clonable cancellation flag.
///
/// Quota waits, backoff sleeps and in-flight requests all race against it,
/// so cancelling returns control promptly instead of after the current wait.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            log::info!("Cancellation requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Runs `future` unless cancellation wins the race.
    pub async fn guard<F>(&self, future: F) -> Result<F::Output, AppError>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            output = future => Ok(output),
            _ = self.cancelled() => Err(AppError::Cancelled),
        }
    }

    /// Sleeps on `clock`, returning early with `Cancelled`.
    pub async fn sleep(&self, clock: &dyn Clock, duration: Duration) -> Result<(), AppError> {
        self.guard(clock.sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::clock::SystemClock;

    #[tokio::test]
    async fn cancel_interrupts_a_long_sleep() {
        let signal = CancellationSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = signal.sleep(&SystemClock, Duration::from_secs(3600)).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn guard_refuses_work_after_cancel() {
        let signal = CancellationSignal::new();
        signal.cancel();
        assert!(signal.guard(async { 1 }).await.is_err());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn guard_passes_output_through() {
        let signal = CancellationSignal::new();
        assert_eq!(signal.guard(async { 7 }).await.unwrap(), 7);
    }
}
