//! Core configuration.
//!
//! Every knob has a default, so an empty YAML document is a valid config.
//! Durations are integer milliseconds or seconds, as the field names say.
//!
//! ```yaml
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 500
//! retry_overrides:
//!   vision:
//!     max_attempts: 2
//! circuit_breaker:
//!   failure_threshold: 5
//!   recovery_timeout_secs: 30
//! session:
//!   context_budget_chars: 1200
//! ```
//!
//! Environment variables (`NADAR_*`) are applied on top by
//! [`CoreConfig::apply_env_overrides`].

use crate::cache::CacheConfig;
use crate::error_kind::ErrorKind;
use crate::image_store::ImageStoreConfig;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

/// Longest TTL or sweep interval a config may ask for: 30 days.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// `0` disables the per-attempt timeout.
    pub per_attempt_timeout_ms: u64,
    /// Kinds worth retrying. Empty means the taxonomy's retryable kinds.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            per_attempt_timeout_ms: 30_000,
            retryable_kinds: Vec::new(),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let timeout = (self.per_attempt_timeout_ms > 0)
            .then(|| Duration::from_millis(self.per_attempt_timeout_ms));
        let policy = RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_per_attempt_timeout(timeout);
        if self.retryable_kinds.is_empty() {
            policy
        } else {
            policy.with_retryable_kinds(self.retryable_kinds.iter().copied())
        }
    }

    fn validate(&self, path: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(invalid(path, "max_attempts", "must be at least 1"));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(invalid(
                path,
                "backoff_multiplier",
                format!("must be a finite number >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(
                path,
                "base_delay_ms",
                format!(
                    "base delay {}ms exceeds max delay {}ms",
                    self.base_delay_ms, self.max_delay_ms
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub monitoring_window_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_secs: 30,
            monitoring_window_secs: 60,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_success_threshold(self.success_threshold)
            .with_recovery_timeout(Duration::from_secs(self.recovery_timeout_secs))
            .with_monitoring_window(Duration::from_secs(self.monitoring_window_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// `0` disables the background sweep.
    pub sweep_interval_secs: u64,
}

impl Default for ResponseCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 500,
            sweep_interval_secs: 60,
        }
    }
}

impl ResponseCacheSettings {
    pub fn to_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_enabled(self.enabled)
            .with_ttl(Duration::from_secs(self.ttl_secs))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStoreSettings {
    pub max_entries: usize,
    pub ttl_secs: u64,
    /// `0` disables the background sweep.
    pub sweep_interval_secs: u64,
}

impl Default for ImageStoreSettings {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl ImageStoreSettings {
    pub fn to_config(&self) -> Result<ImageStoreConfig> {
        let max_entries = NonZeroUsize::new(self.max_entries)
            .ok_or_else(|| invalid("image_store", "max_entries", "must be at least 1"))?;
        Ok(ImageStoreConfig::new(
            max_entries,
            Duration::from_secs(self.ttl_secs),
        ))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub context_budget_chars: usize,
    /// `0` disables the background sweep.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            context_budget_chars: 1200,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetrySettings,
    /// Per-dependency retry policies, keyed by provider name.
    pub retry_overrides: BTreeMap<String, RetrySettings>,
    pub circuit_breaker: CircuitBreakerSettings,
    pub response_cache: ResponseCacheSettings,
    pub image_store: ImageStoreSettings,
    pub session: SessionSettings,
}

impl CoreConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {e}"),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `NADAR_*` process environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, e.g. a map in tests.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `NADAR_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
    /// | `NADAR_RETRY_BASE_DELAY_MS` | `retry.base_delay_ms` |
    /// | `NADAR_RETRY_MAX_DELAY_MS` | `retry.max_delay_ms` |
    /// | `NADAR_RETRY_ATTEMPT_TIMEOUT_MS` | `retry.per_attempt_timeout_ms` |
    /// | `NADAR_BREAKER_FAILURE_THRESHOLD` | `circuit_breaker.failure_threshold` |
    /// | `NADAR_BREAKER_SUCCESS_THRESHOLD` | `circuit_breaker.success_threshold` |
    /// | `NADAR_BREAKER_RECOVERY_SECS` | `circuit_breaker.recovery_timeout_secs` |
    /// | `NADAR_CACHE_ENABLED` | `response_cache.enabled` |
    /// | `NADAR_CACHE_TTL_SECS` | `response_cache.ttl_secs` |
    /// | `NADAR_IMAGE_MAX_ENTRIES` | `image_store.max_entries` |
    /// | `NADAR_IMAGE_TTL_SECS` | `image_store.ttl_secs` |
    /// | `NADAR_SESSION_TTL_SECS` | `session.ttl_secs` |
    /// | `NADAR_CONTEXT_BUDGET_CHARS` | `session.context_budget_chars` |
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parse(&lookup, "NADAR_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_parse(&lookup, "NADAR_RETRY_BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        override_parse(&lookup, "NADAR_RETRY_MAX_DELAY_MS", &mut self.retry.max_delay_ms)?;
        override_parse(
            &lookup,
            "NADAR_RETRY_ATTEMPT_TIMEOUT_MS",
            &mut self.retry.per_attempt_timeout_ms,
        )?;
        override_parse(
            &lookup,
            "NADAR_BREAKER_FAILURE_THRESHOLD",
            &mut self.circuit_breaker.failure_threshold,
        )?;
        override_parse(
            &lookup,
            "NADAR_BREAKER_SUCCESS_THRESHOLD",
            &mut self.circuit_breaker.success_threshold,
        )?;
        override_parse(
            &lookup,
            "NADAR_BREAKER_RECOVERY_SECS",
            &mut self.circuit_breaker.recovery_timeout_secs,
        )?;
        override_parse(&lookup, "NADAR_CACHE_ENABLED", &mut self.response_cache.enabled)?;
        override_parse(&lookup, "NADAR_CACHE_TTL_SECS", &mut self.response_cache.ttl_secs)?;
        override_parse(&lookup, "NADAR_IMAGE_MAX_ENTRIES", &mut self.image_store.max_entries)?;
        override_parse(&lookup, "NADAR_IMAGE_TTL_SECS", &mut self.image_store.ttl_secs)?;
        override_parse(&lookup, "NADAR_SESSION_TTL_SECS", &mut self.session.ttl_secs)?;
        override_parse(
            &lookup,
            "NADAR_CONTEXT_BUDGET_CHARS",
            &mut self.session.context_budget_chars,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate("retry")?;
        for (name, settings) in &self.retry_overrides {
            settings.validate(&format!("retry_overrides.{name}"))?;
        }
        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            return Err(invalid("circuit_breaker", "failure_threshold", "must be at least 1"));
        }
        if cb.success_threshold == 0 {
            return Err(invalid("circuit_breaker", "success_threshold", "must be at least 1"));
        }
        if cb.monitoring_window_secs == 0 {
            return Err(invalid(
                "circuit_breaker",
                "monitoring_window_secs",
                "must be at least 1",
            ));
        }
        if self.response_cache.max_entries == 0 {
            return Err(invalid("response_cache", "max_entries", "must be at least 1"));
        }
        if self.image_store.max_entries == 0 {
            return Err(invalid("image_store", "max_entries", "must be at least 1"));
        }
        if self.image_store.ttl_secs == 0 {
            return Err(invalid("image_store", "ttl_secs", "must be at least 1"));
        }
        if self.session.ttl_secs == 0 {
            return Err(invalid("session", "ttl_secs", "must be at least 1"));
        }
        let bounded = [
            ("circuit_breaker", "recovery_timeout_secs", cb.recovery_timeout_secs),
            ("circuit_breaker", "monitoring_window_secs", cb.monitoring_window_secs),
            ("response_cache", "ttl_secs", self.response_cache.ttl_secs),
            ("response_cache", "sweep_interval_secs", self.response_cache.sweep_interval_secs),
            ("image_store", "ttl_secs", self.image_store.ttl_secs),
            ("image_store", "sweep_interval_secs", self.image_store.sweep_interval_secs),
            ("session", "ttl_secs", self.session.ttl_secs),
            ("session", "sweep_interval_secs", self.session.sweep_interval_secs),
        ];
        for (section, field, secs) in bounded {
            if secs > MAX_TTL_SECS {
                return Err(invalid(
                    section,
                    field,
                    format!("{secs}s exceeds the {MAX_TTL_SECS}s limit"),
                ));
            }
        }
        Ok(())
    }

    /// Retry policy for `dependency`, falling back to the default section.
    pub fn retry_policy_for(&self, dependency: &str) -> RetryPolicy {
        self.retry_overrides
            .get(dependency)
            .unwrap_or(&self.retry)
            .to_policy()
    }
}

fn invalid(section: &str, field: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {field}"),
        ErrorContext::new()
            .with_field_path(format!("{section}.{field}"))
            .with_details(details)
            .with_source("config_loader"),
    )
}

fn override_parse<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *target = raw.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("cannot parse environment override {key}"),
            ErrorContext::new()
                .with_field_path(key)
                .with_details(format!("got {raw:?}"))
                .with_source("env"),
        )
    })?;
    Ok(())
}
