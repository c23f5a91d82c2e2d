//! Error classification at the provider-call boundary.
//!
//! Classification happens once per failed attempt. Everything downstream
//! (retry executor, circuit breaker, telemetry) reads `kind` and `retryable`
//! from the resulting [`ClassifiedError`] and never looks at the raw failure.

use crate::error_kind::ErrorKind;
use crate::provider::ProviderFailure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// A provider failure reduced to the core's error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub message: String,
    pub kind: ErrorKind,
    pub retryable: bool,
    pub temporary: bool,
    pub remediation: String,
}

impl ClassifiedError {
    /// Build an error whose flags follow the kind's defaults.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            retryable: kind.retryable(),
            temporary: kind.temporary(),
            remediation: kind.remediation().to_string(),
        }
    }

    /// Rejection synthesized by an open breaker; never retryable within the call.
    pub fn circuit_open(dependency: &str, retry_in: Option<Duration>) -> Self {
        let message = match retry_in {
            Some(d) => format!(
                "circuit for '{}' is open; next probe allowed in {}ms",
                dependency,
                d.as_millis()
            ),
            None => format!("circuit for '{}' is open", dependency),
        };
        Self::from_kind(ErrorKind::CircuitOpen, message)
    }

    /// Failure recorded when an attempt outlives its per-attempt timeout.
    pub fn attempt_timeout(label: &str, limit: Duration) -> Self {
        Self::from_kind(
            ErrorKind::Timeout,
            format!("{} timed out after {}ms", label, limit.as_millis()),
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        self.kind == ErrorKind::CircuitOpen
    }
}

impl From<ProviderFailure> for ClassifiedError {
    fn from(failure: ProviderFailure) -> Self {
        classify(&failure)
    }
}

impl From<&ProviderFailure> for ClassifiedError {
    fn from(failure: &ProviderFailure) -> Self {
        classify(failure)
    }
}

// Checked in order; the first match wins. Credentials precede invalid input so
// that "invalid API key" is not mistaken for a bad payload, and timeouts
// precede network errors so that "network timeout" is a timeout.
static MESSAGE_PATTERNS: Lazy<Vec<(Regex, ErrorKind)>> = Lazy::new(|| {
    [
        (
            r"(?i)rate.?limit|quota|resource.?(has been )?exhausted|too many requests",
            ErrorKind::RateLimit,
        ),
        (
            r"(?i)timed?.?out|deadline.?exceeded|etimedout",
            ErrorKind::Timeout,
        ),
        (
            r"(?i)api.?key|unauthori[sz]ed|credential|permission.?denied|forbidden",
            ErrorKind::MissingCredentials,
        ),
        (
            r"(?i)econnrefused|econnreset|enotfound|ehostunreach|unreachable|connection (refused|reset|closed|aborted)|dns|socket hang up|fetch failed|network",
            ErrorKind::NetworkError,
        ),
        (
            r"(?i)invalid|malformed|too large|payload|unsupported (mime|media|image|format)|bad request",
            ErrorKind::InvalidInput,
        ),
        (
            r"(?i)unavailable|overloaded|internal server error|bad gateway",
            ErrorKind::ServiceUnavailable,
        ),
    ]
    .into_iter()
    .map(|(pattern, kind)| {
        (
            Regex::new(pattern).expect("classifier patterns are valid regular expressions"),
            kind,
        )
    })
    .collect()
});

fn kind_from_vendor_code(code: &str) -> Option<ErrorKind> {
    let kind = match code {
        "rate_limit_exceeded" | "rate_limited" | "insufficient_quota" | "RESOURCE_EXHAUSTED" => {
            ErrorKind::RateLimit
        }
        "timeout" | "DEADLINE_EXCEEDED" => ErrorKind::Timeout,
        "invalid_api_key" | "authentication_error" | "PERMISSION_DENIED" | "UNAUTHENTICATED" => {
            ErrorKind::MissingCredentials
        }
        "invalid_request" | "invalid_request_error" | "request_too_large" | "INVALID_ARGUMENT" => {
            ErrorKind::InvalidInput
        }
        "server_error" | "overloaded_error" | "UNAVAILABLE" | "INTERNAL" => {
            ErrorKind::ServiceUnavailable
        }
        _ => return None,
    };
    Some(kind)
}

/// Classify a raw provider failure. Pure; unrecognized failures are `UNKNOWN`
/// and not retryable.
pub fn classify(failure: &ProviderFailure) -> ClassifiedError {
    let kind = failure
        .code
        .as_deref()
        .and_then(kind_from_vendor_code)
        .or_else(|| failure.status.and_then(ErrorKind::from_http_status))
        .unwrap_or_else(|| classify_message(&failure.message));
    ClassifiedError::from_kind(kind, failure.to_string())
}

/// Pattern-match a bare failure message.
pub fn classify_message(message: &str) -> ErrorKind {
    MESSAGE_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
