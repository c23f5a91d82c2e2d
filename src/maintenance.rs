//! Background expiry sweeps.
//!
//! Stores expire entries lazily on read, but entries nobody reads again would
//! otherwise stay resident. A [`SweepTask`] runs a cleanup closure on a fixed
//! interval until it is shut down or dropped.

use crate::perf::timed;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest lifetime any stored entry is given, whatever TTL was asked for.
pub const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Instant at which an entry written at `now` with `ttl` expires.
///
/// `Instant + Duration` panics on overflow, and stores compute this while
/// holding their lock, so the TTL is clamped first.
pub(crate) fn expiry_deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_ENTRY_LIFETIME)).unwrap_or(now)
}

pub struct SweepTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SweepTask {
    /// Spawn a sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one full `interval` after spawning. `sweep` returns
    /// the number of entries it removed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut sweep: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = usize> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let start = expiry_deadline(Instant::now(), interval);
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let (removed, took) = timed(sweep()).await;
                        if removed > 0 {
                            debug!(
                                sweep = name,
                                removed,
                                took_us = took.as_micros() as u64,
                                "expired entries swept"
                            );
                        }
                    }
                }
            }
            debug!(sweep = name, "sweep task stopped");
        });
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn runs_on_interval_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = SweepTask::spawn("test", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            }
        });
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_clamped_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(expiry_deadline(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(expiry_deadline(now, Duration::MAX), now + MAX_ENTRY_LIFETIME);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = SweepTask::spawn("test", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move { counter.fetch_add(1, Ordering::SeqCst) }
        });
        drop(task);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
