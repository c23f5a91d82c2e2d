use super::classify::ClassifiedError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Failures still inside the monitoring window.
    pub recent_failures: usize,
    pub half_open_successes: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_timestamps: VecDeque<Instant>,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

impl State {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.failure_timestamps.front() {
            if now.duration_since(*oldest) > window {
                self.failure_timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Three-state circuit breaker guarding one external dependency.
///
/// - Closed: failures inside the monitoring window are counted; reaching the
///   threshold opens the circuit
/// - Open: calls fail fast with `CIRCUIT_OPEN` until the recovery timeout has
///   passed since the last failure; the first call after that probes
/// - Half-open: calls pass; enough successes close the circuit, any failure
///   reopens it
///
/// A call wrapped in retries counts as one outcome here.
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failure_timestamps: VecDeque::new(),
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    // Every mutation leaves State consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject a call.
    pub fn try_acquire(&self) -> Result<(), ClassifiedError> {
        let mut st = self.lock();
        if st.state != CircuitState::Open {
            return Ok(());
        }
        let now = Instant::now();
        let since_failure = st
            .last_failure
            .map(|t| now.duration_since(t))
            .unwrap_or(self.cfg.recovery_timeout);
        if since_failure >= self.cfg.recovery_timeout {
            st.state = CircuitState::HalfOpen;
            st.half_open_successes = 0;
            info!(dependency = %self.name, state = "half_open", "circuit breaker probing recovery");
            return Ok(());
        }
        Err(ClassifiedError::circuit_open(
            &self.name,
            Some(self.cfg.recovery_timeout - since_failure),
        ))
    }

    pub fn on_success(&self) {
        let mut st = self.lock();
        let now = Instant::now();
        st.prune(now, self.cfg.monitoring_window);
        if st.state == CircuitState::HalfOpen {
            st.half_open_successes = st.half_open_successes.saturating_add(1);
            if st.half_open_successes >= self.cfg.success_threshold {
                st.state = CircuitState::Closed;
                st.half_open_successes = 0;
                st.failure_timestamps.clear();
                info!(dependency = %self.name, state = "closed", "circuit breaker closed");
            }
        }
    }

    pub fn on_failure(&self) {
        let mut st = self.lock();
        let now = Instant::now();
        st.prune(now, self.cfg.monitoring_window);
        st.failure_timestamps.push_back(now);
        match st.state {
            CircuitState::Closed => {
                if st.failure_timestamps.len() >= self.cfg.failure_threshold as usize {
                    st.state = CircuitState::Open;
                    st.half_open_successes = 0;
                    st.last_failure = Some(now);
                    warn!(
                        dependency = %self.name,
                        state = "open",
                        failures = st.failure_timestamps.len(),
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                st.state = CircuitState::Open;
                st.half_open_successes = 0;
                st.last_failure = Some(now);
                warn!(dependency = %self.name, state = "open", "circuit breaker probe failed; reopening");
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => st.last_failure = Some(now),
        }
    }

    /// Record a classified outcome; kinds that say nothing about the
    /// dependency's health are ignored.
    pub fn record_error(&self, err: &ClassifiedError) {
        if err.kind.counts_against_dependency() {
            self.on_failure();
        }
    }

    /// Run `operation` under the breaker.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.record_error(&err);
                Err(err)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut st = self.lock();
        let now = Instant::now();
        st.prune(now, self.cfg.monitoring_window);
        let open_remaining_ms = match (st.state, st.last_failure) {
            (CircuitState::Open, Some(at)) => {
                let elapsed = now.duration_since(at);
                (elapsed < self.cfg.recovery_timeout)
                    .then(|| (self.cfg.recovery_timeout - elapsed).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: st.state,
            failure_threshold: self.cfg.failure_threshold,
            success_threshold: self.cfg.success_threshold,
            recent_failures: st.failure_timestamps.len(),
            half_open_successes: st.half_open_successes,
            open_remaining_ms,
        }
    }
}
