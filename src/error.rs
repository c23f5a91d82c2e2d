use crate::resilience::ClassifiedError;
use thiserror::Error;

/// Structured error context for configuration and store failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key or field that caused the error (e.g., "retry.max_attempts")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "config_loader", "image_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the assistant core.
///
/// Provider failures arrive already classified; everything else is a local
/// configuration, validation or storage problem.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] ClassifiedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Store { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The classified provider failure, if this error came from an AI call.
    pub fn as_classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Provider(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind::ErrorKind;

    #[test]
    fn display_includes_context_parts() {
        let err = Error::configuration_with_context(
            "max_attempts must be at least 1",
            ErrorContext::new()
                .with_field_path("retry.max_attempts")
                .with_source("config_loader"),
        );
        let text = err.to_string();
        assert!(text.contains("max_attempts must be at least 1"));
        assert!(text.contains("field: retry.max_attempts"));
        assert!(text.contains("source: config_loader"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("retry.max_attempts")
        );
    }

    #[test]
    fn empty_context_renders_no_suffix() {
        let err = Error::store_with_context("lock lost", ErrorContext::default());
        assert_eq!(err.to_string(), "Store error: lock lost");
    }

    #[test]
    fn provider_errors_expose_classification() {
        let err: Error = ClassifiedError::from_kind(ErrorKind::RateLimit, "429").into();
        assert_eq!(err.as_classified().map(|c| c.kind), Some(ErrorKind::RateLimit));
        assert!(err.context().is_none());
    }
}
