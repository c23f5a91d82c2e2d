//! Provider boundary: the abstract AI vendor interface.
//!
//! The core never builds vendor payloads. A provider adapter implements
//! [`AiProvider`] and resolves the vendor's response shape once, returning
//! either typed [`Signals`] or plain text. Failures come back as
//! [`ProviderFailure`], which the error classifier turns into a
//! [`ClassifiedError`](crate::resilience::ClassifiedError).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw failure reported by a provider adapter.
///
/// This is deliberately unstructured beyond the HTTP status and the vendor's
/// own error code; the classifier decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .status.map(|s| format!("HTTP {s}: ")).unwrap_or_default())]
pub struct ProviderFailure {
    pub status: Option<u16>,
    /// Vendor error code, e.g. `"insufficient_quota"`.
    pub code: Option<String>,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Scene signals extracted by a fast inspection pass over an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub has_text: bool,
    pub has_people: bool,
    pub has_currency: bool,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    pub lighting: Option<String>,
}

impl Signals {
    pub fn has_hazards(&self) -> bool {
        !self.hazards.is_empty()
    }
}

/// Kind of generation request, part of the response cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Describe,
    Question,
    Inspect,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Question => "question",
            Self::Inspect => "inspect",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Quick structured pass over an image.
    async fn inspect_image(&self, image: &[u8], mime_type: &str)
        -> Result<Signals, ProviderFailure>;

    /// Free-text generation grounded on an image.
    async fn generate_response(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ProviderFailure>;

    /// Dependency name used to select a circuit breaker and retry policy.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_includes_status_when_present() {
        let f = ProviderFailure::http(429, "Resource has been exhausted");
        assert_eq!(f.to_string(), "HTTP 429: Resource has been exhausted");
        let f = ProviderFailure::new("connection reset by peer");
        assert_eq!(f.to_string(), "connection reset by peer");
    }

    #[test]
    fn signals_deserialize_with_missing_lists() {
        let s: Signals =
            serde_json::from_str(r#"{"has_text":true,"has_people":false,"has_currency":false,"lighting":"dim"}"#)
                .unwrap();
        assert!(s.has_text);
        assert!(!s.has_hazards());
        assert_eq!(s.lighting.as_deref(), Some("dim"));
    }
}
