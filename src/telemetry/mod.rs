//! Telemetry sinks for per-request outcome records.
//!
//! The core writes one [`TelemetryEntry`] per assistant operation and never
//! reads it back. Where the records go is up to the application.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TelemetryLogger`] | Write-only sink trait |
//! | [`NoopTelemetry`] | Discards everything (default) |
//! | [`InMemoryTelemetry`] | Bounded buffer for tests and diagnostics |
//! | [`TracingTelemetry`] | Emits each record as a `tracing` event |
//! | [`CompositeTelemetry`] | Fans out to several sinks |

use crate::error_kind::ErrorKind;
use crate::provider::RequestKind;
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub timestamp_ms: u64,
    pub mode: RequestKind,
    pub dependency: String,
    pub latency_ms: u64,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub cache_hit: bool,
    /// Provider attempts made; zero on a cache hit or an open circuit.
    pub attempts: u32,
}

impl TelemetryEntry {
    pub fn new(mode: RequestKind, dependency: impl Into<String>) -> Self {
        Self {
            timestamp_ms: timestamp_ms(),
            mode,
            dependency: dependency.into(),
            latency_ms: 0,
            success: true,
            error_kind: None,
            cache_hit: false,
            attempts: 0,
        }
    }

    pub fn with_latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn with_error(mut self, kind: ErrorKind) -> Self {
        self.success = false;
        self.error_kind = Some(kind);
        self
    }

    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = hit;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[async_trait]
pub trait TelemetryLogger: Send + Sync {
    async fn log(&self, entry: TelemetryEntry) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct NoopTelemetry;

#[async_trait]
impl TelemetryLogger for NoopTelemetry {
    async fn log(&self, _entry: TelemetryEntry) -> Result<()> {
        Ok(())
    }
}

pub fn noop_telemetry() -> Arc<dyn TelemetryLogger> {
    Arc::new(NoopTelemetry)
}

/// In-memory sink for testing; keeps the newest `max_entries` records.
pub struct InMemoryTelemetry {
    entries: Arc<RwLock<VecDeque<TelemetryEntry>>>,
    max_entries: usize,
}

impl InMemoryTelemetry {
    pub fn new(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max,
        }
    }
    pub fn entries(&self) -> Vec<TelemetryEntry> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
    pub fn failures(&self) -> Vec<TelemetryEntry> {
        self.entries().into_iter().filter(|e| !e.success).collect()
    }
    pub fn clear(&self) {
        if let Ok(mut e) = self.entries.write() {
            e.clear();
        }
    }
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TelemetryLogger for InMemoryTelemetry {
    async fn log(&self, entry: TelemetryEntry) -> Result<()> {
        if let Ok(mut entries) = self.entries.write() {
            entries.push_back(entry);
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
        }
        Ok(())
    }
}

/// Renders records as structured `tracing` events under the `telemetry` target.
pub struct TracingTelemetry;

#[async_trait]
impl TelemetryLogger for TracingTelemetry {
    async fn log(&self, entry: TelemetryEntry) -> Result<()> {
        let error_kind = entry.error_kind.map(|k| k.name()).unwrap_or("");
        if entry.success {
            tracing::info!(
                target: "telemetry",
                mode = entry.mode.as_str(),
                dependency = entry.dependency.as_str(),
                latency_ms = entry.latency_ms,
                cache_hit = entry.cache_hit,
                attempts = entry.attempts,
                "request succeeded"
            );
        } else {
            tracing::warn!(
                target: "telemetry",
                mode = entry.mode.as_str(),
                dependency = entry.dependency.as_str(),
                latency_ms = entry.latency_ms,
                attempts = entry.attempts,
                error_kind,
                "request failed"
            );
        }
        Ok(())
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeTelemetry {
    sinks: Vec<Arc<dyn TelemetryLogger>>,
}

impl CompositeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_sink(mut self, sink: Arc<dyn TelemetryLogger>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl TelemetryLogger for CompositeTelemetry {
    async fn log(&self, entry: TelemetryEntry) -> Result<()> {
        join_all(self.sinks.iter().map(|s| s.log(entry.clone()))).await;
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        join_all(self.sinks.iter().map(|s| s.close())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_keeps_newest_entries() {
        let sink = InMemoryTelemetry::new(2);
        for attempts in 1..=3 {
            sink.log(TelemetryEntry::new(RequestKind::Describe, "vision").with_attempts(attempts))
                .await
                .unwrap();
        }
        let attempts: Vec<u32> = sink.entries().iter().map(|e| e.attempts).collect();
        assert_eq!(attempts, vec![2, 3]);
    }

    #[tokio::test]
    async fn composite_fans_out() {
        let a = Arc::new(InMemoryTelemetry::new(10));
        let b = Arc::new(InMemoryTelemetry::new(10));
        let composite = CompositeTelemetry::new()
            .add_sink(a.clone())
            .add_sink(b.clone())
            .add_sink(Arc::new(TracingTelemetry));
        composite
            .log(TelemetryEntry::new(RequestKind::Question, "vision").with_error(ErrorKind::Timeout))
            .await
            .unwrap();
        assert_eq!(a.failures().len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(b.entries()[0].error_kind, Some(ErrorKind::Timeout));
    }

    #[test]
    fn entry_serializes_with_kind_names() {
        let entry = TelemetryEntry::new(RequestKind::Inspect, "vision").with_error(ErrorKind::RateLimit);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["mode"], "inspect");
        assert_eq!(json["error_kind"], "RATE_LIMIT");
        assert_eq!(json["success"], false);
    }
}
