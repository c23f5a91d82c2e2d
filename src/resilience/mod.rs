//! Resilience primitives for outbound AI calls.
//!
//! Every provider call goes through the same stack, outermost first:
//!
//! | Layer | Responsibility |
//! |-------|----------------|
//! | [`circuit_breaker`] | Fail fast while a dependency is unhealthy |
//! | [`retry`] | Repeat transient failures with exponential backoff |
//! | [`classify`] | Reduce each raw failure to an [`ErrorKind`](crate::error_kind::ErrorKind) |
//!
//! A retried call that exhausts its attempts is a single failure from the
//! breaker's point of view.
//!
//! ```rust
//! use nadar_core::provider::ProviderFailure;
//! use nadar_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let breaker = CircuitBreaker::new(
//!     "vision",
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(5)
//!         .with_recovery_timeout(Duration::from_secs(30)),
//! );
//! let retry = RetryExecutor::new(RetryPolicy::new().with_max_attempts(3));
//!
//! let text = breaker
//!     .call(|| retry.execute("describe", || async {
//!         Ok::<_, ProviderFailure>("a crosswalk with the signal showing walk".to_string())
//!     }))
//!     .await;
//! assert!(text.is_ok());
//! # }
//! ```

pub mod circuit_breaker;
pub mod classify;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use classify::{classify, classify_message, ClassifiedError};
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryExecutor, RetryPolicy};
