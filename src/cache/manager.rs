//! Response cache manager.

use super::backend::CacheBackend;
use super::key::ResponseCacheKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub enabled: bool,
    pub max_entry_size: usize,
    pub key_prefix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            enabled: true,
            max_entry_size: 64 * 1024,
            key_prefix: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Expired entries removed, by sweeps or lazily by the backend.
    pub expired: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    expired: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed cache of generated text.
///
/// Fails soft: a backend error is logged and reported as a miss, and a failed
/// write is dropped. Only successful generations should be written here.
pub struct ResponseCache {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: AtomicStats::default(),
        }
    }

    pub async fn get(&self, key: &ResponseCacheKey) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let prefixed = self.prefix_key(key);
        match self.backend.get(&prefixed).await {
            Ok(Some(value)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = self.backend.name(), error = %e, "response cache read failed; treating as miss");
                None
            }
        }
    }

    /// Store `value`; `ttl` defaults to the configured TTL.
    pub async fn set(&self, key: &ResponseCacheKey, value: &str, ttl: Option<Duration>) {
        if !self.config.enabled || value.len() > self.config.max_entry_size {
            return;
        }
        let prefixed = self.prefix_key(key);
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        match self.backend.set(&prefixed, value, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = self.backend.name(), error = %e, "response cache write failed");
            }
        }
    }

    pub async fn invalidate(&self, key: &ResponseCacheKey) -> bool {
        let prefixed = self.prefix_key(key);
        self.backend.delete(&prefixed).await.unwrap_or(false)
    }

    /// Remove expired entries. Returns the number removed.
    pub async fn cleanup(&self) -> usize {
        match self.backend.cleanup_expired().await {
            Ok(removed) => {
                self.stats.expired.fetch_add(removed as u64, Ordering::Relaxed);
                removed
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = self.backend.name(), error = %e, "response cache cleanup failed");
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.to_stats();
        stats.expired += self.backend.lazily_expired();
        stats
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    fn prefix_key(&self, key: &ResponseCacheKey) -> ResponseCacheKey {
        match self.config.key_prefix {
            Some(ref p) => ResponseCacheKey {
                hash: format!("{}:{}", p, key.hash),
                ..key.clone()
            },
            None => key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NullCache};
    use crate::provider::RequestKind;
    use tokio::time::advance;

    fn key() -> ResponseCacheKey {
        ResponseCacheKey::derive(b"jpeg bytes", "en", RequestKind::Describe)
    }

    fn cache() -> ResponseCache {
        ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(100)))
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_returns_value() {
        let cache = cache();
        cache.set(&key(), "A kitchen counter with a kettle.", None).await;
        assert_eq!(
            cache.get(&key()).await.as_deref(),
            Some("A kitchen counter with a kettle.")
        );
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.sets), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_is_five_minutes() {
        let cache = cache();
        assert_eq!(cache.default_ttl(), Duration::from_secs(300));
        cache.set(&key(), "v", None).await;
        advance(Duration::from_secs(299)).await;
        assert!(cache.get(&key()).await.is_some());
        advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_overrides_default() {
        let cache = cache();
        cache.set(&key(), "v", Some(Duration::from_secs(1))).await;
        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.stats().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_on_read_is_counted() {
        let cache = cache();
        cache.set(&key(), "v", Some(Duration::from_secs(1))).await;
        advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key()).await.is_none());
        assert_eq!(cache.cleanup().await, 0);
        let stats = cache.stats();
        assert_eq!((stats.misses, stats.expired), (1, 1));
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = ResponseCache::new(
            CacheConfig::new().with_enabled(false),
            Box::new(MemoryCache::new(10)),
        );
        cache.set(&key(), "v", None).await;
        assert!(cache.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn oversized_values_are_not_cached() {
        let cache = cache();
        let big = "x".repeat(CacheConfig::default().max_entry_size + 1);
        cache.set(&key(), &big, None).await;
        assert!(cache.get(&key()).await.is_none());
        assert_eq!(cache.stats().sets, 0);
    }

    #[tokio::test]
    async fn prefix_keeps_namespaces_apart() {
        let cache = ResponseCache::new(
            CacheConfig::new().with_key_prefix("v2"),
            Box::new(MemoryCache::new(10)),
        );
        cache.set(&key(), "v", None).await;
        assert_eq!(cache.get(&key()).await.as_deref(), Some("v"));
        assert!(cache.invalidate(&key()).await);
        assert!(cache.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn hit_ratio_counts_misses() {
        let cache = ResponseCache::new(CacheConfig::default(), Box::new(NullCache::new()));
        assert!(cache.get(&key()).await.is_none());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hit_ratio(), 0.0);
        assert_eq!(cache.backend_name(), "null");
    }
}
