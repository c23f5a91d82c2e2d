//! Error kind taxonomy for outbound AI calls.
//!
//! Each provider failure is reduced to one [`ErrorKind`] at the provider-call
//! boundary. The kind carries the retry semantics consumed by the retry
//! executor and the circuit breaker, and a remediation hint suitable for
//! showing to an end user.
//!
//! | Kind                  | Retryable | Temporary | Typical source             |
//! |-----------------------|-----------|-----------|----------------------------|
//! | `RATE_LIMIT`          | yes       | yes       | HTTP 429, quota exhausted  |
//! | `TIMEOUT`             | yes       | yes       | HTTP 408/504, attempt timer |
//! | `NETWORK_ERROR`       | yes       | yes       | DNS, reset, unreachable    |
//! | `SERVICE_UNAVAILABLE` | yes       | yes       | HTTP 500/502/503/529       |
//! | `INVALID_INPUT`       | no        | no        | HTTP 400/413, bad image    |
//! | `MISSING_CREDENTIALS` | no        | no        | HTTP 401/403, no API key   |
//! | `CIRCUIT_OPEN`        | no        | yes       | synthesized by the breaker |
//! | `UNKNOWN`             | no        | no        | anything else              |
//!
//! ```rust
//! use nadar_core::error_kind::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(429).unwrap();
//! assert_eq!(kind.name(), "RATE_LIMIT");
//! assert!(kind.retryable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request rate or account quota exceeded
    RateLimit,
    /// Attempt did not complete in time
    Timeout,
    /// Provider unreachable at the transport level
    NetworkError,
    /// Provider reachable but failing or overloaded
    ServiceUnavailable,
    /// Malformed or oversized input; retrying cannot help
    InvalidInput,
    /// API key absent, invalid or lacking permission
    MissingCredentials,
    /// Rejected locally because the dependency's breaker is open
    CircuitOpen,
    /// Unrecognized failure
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        Self::RateLimit,
        Self::Timeout,
        Self::NetworkError,
        Self::ServiceUnavailable,
        Self::InvalidInput,
        Self::MissingCredentials,
        Self::CircuitOpen,
        Self::Unknown,
    ];

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether a failed attempt of this kind may succeed if repeated.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::NetworkError | Self::ServiceUnavailable
        )
    }

    /// Whether the condition is expected to clear on its own.
    #[inline]
    pub fn temporary(&self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::Timeout
                | Self::NetworkError
                | Self::ServiceUnavailable
                | Self::CircuitOpen
        )
    }

    /// Whether a failure of this kind says something about the dependency's health.
    ///
    /// Bad input fails on a healthy provider too, and an open-circuit rejection
    /// never reached the provider at all.
    #[inline]
    pub fn counts_against_dependency(&self) -> bool {
        !matches!(self, Self::InvalidInput | Self::CircuitOpen)
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            Self::RateLimit => "The service is busy right now. Please wait a moment and try again.",
            Self::Timeout => "The request took too long. Check your connection and try again.",
            Self::NetworkError => {
                "Could not reach the service. Check your internet connection and try again."
            }
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again shortly."
            }
            Self::InvalidInput => {
                "The image or audio could not be processed. Try a smaller or clearer capture."
            }
            Self::MissingCredentials => {
                "The assistant is not configured correctly. Contact the administrator."
            }
            Self::CircuitOpen => {
                "The service is recovering from repeated failures. Please try again in a minute."
            }
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Maps an HTTP status to the most likely kind; `None` for statuses that
    /// carry no classification signal on their own.
    pub fn from_http_status(status: u16) -> Option<Self> {
        let kind = match status {
            400 | 413 | 415 | 422 => Self::InvalidInput,
            401 | 403 => Self::MissingCredentials,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimit,
            500 | 502 | 503 | 529 => Self::ServiceUnavailable,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable_and_temporary() {
        for kind in [
            ErrorKind::RateLimit,
            ErrorKind::Timeout,
            ErrorKind::NetworkError,
            ErrorKind::ServiceUnavailable,
        ] {
            assert!(kind.retryable(), "{kind} should be retryable");
            assert!(kind.temporary(), "{kind} should be temporary");
        }
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::MissingCredentials,
            ErrorKind::CircuitOpen,
            ErrorKind::Unknown,
        ] {
            assert!(!kind.retryable(), "{kind} should not be retryable");
        }
        assert!(ErrorKind::CircuitOpen.temporary());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorKind::from_http_status(429), Some(ErrorKind::RateLimit));
        assert_eq!(ErrorKind::from_http_status(401), Some(ErrorKind::MissingCredentials));
        assert_eq!(ErrorKind::from_http_status(413), Some(ErrorKind::InvalidInput));
        assert_eq!(ErrorKind::from_http_status(504), Some(ErrorKind::Timeout));
        assert_eq!(ErrorKind::from_http_status(503), Some(ErrorKind::ServiceUnavailable));
        assert_eq!(ErrorKind::from_http_status(200), None);
        assert_eq!(ErrorKind::from_http_status(418), None);
    }

    #[test]
    fn names_match_serde_representation() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
            assert!(!kind.remediation().is_empty());
        }
    }

    #[test]
    fn qualifying_failures_exclude_client_side_kinds() {
        assert!(!ErrorKind::InvalidInput.counts_against_dependency());
        assert!(!ErrorKind::CircuitOpen.counts_against_dependency());
        assert!(ErrorKind::Unknown.counts_against_dependency());
        assert!(ErrorKind::MissingCredentials.counts_against_dependency());
    }
}
