//! Cache backend implementations.

use super::key::ResponseCacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct CacheEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            last_accessed: now,
        }
    }
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

/// Storage behind the response cache. The in-memory backend is the default;
/// an external key-value store can implement the same trait.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<String>>;
    async fn set(&self, key: &ResponseCacheKey, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &ResponseCacheKey) -> Result<bool>;
    /// Drop expired entries, returning how many were removed.
    async fn cleanup_expired(&self) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;

    /// Expired entries the backend dropped by itself, on read or to make
    /// room. Removals by `cleanup_expired` are not included.
    fn lazily_expired(&self) -> u64 {
        0
    }
}

fn poisoned() -> Error {
    Error::store_with_context(
        "response cache lock poisoned",
        ErrorContext::new().with_source("memory_cache"),
    )
}

pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: usize,
    lazily_expired: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
            lazily_expired: AtomicU64::new(0),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries.write().map_err(|_| poisoned())
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        self.lazily_expired
            .fetch_add((before - entries.len()) as u64, Ordering::Relaxed);
        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                    tracing::debug!(key = %k, "response cache evicted least recently used entry");
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<String>> {
        let mut entries = self.write()?;
        let now = Instant::now();
        let live = entries.get_mut(key.as_str()).map(|entry| {
            (!entry.is_expired(now)).then(|| {
                entry.last_accessed = now;
                entry.value.clone()
            })
        });
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key.as_str());
                self.lazily_expired.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &ResponseCacheKey, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.write()?;
        if !entries.contains_key(key.as_str()) {
            self.evict_if_needed(&mut entries, Instant::now());
        }
        entries.insert(key.hash.clone(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &ResponseCacheKey) -> Result<bool> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self.read()?.values().filter(|e| !e.is_expired(now)).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn lazily_expired(&self) -> u64 {
        self.lazily_expired.load(Ordering::Relaxed)
    }
}

/// Backend that stores nothing; every lookup misses.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _: &ResponseCacheKey) -> Result<Option<String>> {
        Ok(None)
    }
    async fn set(&self, _: &ResponseCacheKey, _: &str, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &ResponseCacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn cleanup_expired(&self) -> Result<usize> {
        Ok(0)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
