//! Retry executor with exponential backoff and per-attempt timeouts.

use super::classify::ClassifiedError;
use crate::error_kind::ErrorKind;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Immutable retry configuration, created once per dependency type.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_kinds: HashSet<ErrorKind>,
    /// `None` lets an attempt run for as long as the operation takes.
    pub per_attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            retryable_kinds: ErrorKind::ALL.into_iter().filter(|k| k.retryable()).collect(),
            per_attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_per_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.per_attempt_timeout = timeout;
        self
    }

    /// Delay slept after failed attempt `attempt` (1-based):
    /// `min(base * multiplier^(attempt-1), max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.base_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(scaled.max(0.0).round() as u64)
        }
    }

    /// Whether the policy allows another attempt after this error.
    pub fn should_retry(&self, err: &ClassifiedError) -> bool {
        err.retryable && self.retryable_kinds.contains(&err.kind)
    }
}

/// Runs an operation up to `max_attempts` times.
///
/// The executor does not log telemetry; callers count attempts inside their
/// operation closure if they need to report them.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` with retries.
    ///
    /// A timed-out attempt counts as a `TIMEOUT` failure. The attempt's future is
    /// dropped, which stops waiting locally; any remote work it started is not
    /// cancelled and may still complete.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<ClassifiedError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match self.policy.per_attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result.map_err(Into::into),
                    Err(_) => Err(ClassifiedError::attempt_timeout(label, limit)),
                },
                None => operation().await.map_err(Into::into),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !self.policy.should_retry(&err) {
                return Err(err);
            }

            let delay = self.policy.backoff_delay(attempt);
            debug!(
                label,
                attempt,
                max_attempts,
                kind = err.kind.name(),
                delay_ms = delay.as_millis() as u64,
                "retrying after failed attempt"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
