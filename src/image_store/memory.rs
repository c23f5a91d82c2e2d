//! In-process image store: LRU-bounded count, TTL-bounded age.

use super::{ImageKey, ImageStore, StoredImage};
use crate::maintenance::expiry_deadline;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStoreConfig {
    pub max_entries: NonZeroUsize,
    /// Upper bound on any entry's age; per-call TTLs are capped to it.
    pub ttl: Duration,
}

impl Default for ImageStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl ImageStoreConfig {
    pub fn new(max_entries: NonZeroUsize, ttl: Duration) -> Self {
        Self { max_entries, ttl }
    }
}

#[derive(Debug)]
struct ImageEntry {
    image: StoredImage,
    inserted_at: Instant,
    last_accessed_at: Instant,
    expires_at: Instant,
}

impl ImageEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Images live once, under their token. A session's latest image is an alias
/// onto a token, so it never takes a second LRU slot.
struct Entries {
    images: LruCache<String, ImageEntry>,
    sessions: HashMap<String, String>,
}

impl Entries {
    fn token_for(&self, key: &ImageKey) -> Option<String> {
        match key {
            ImageKey::Token(token) => Some(token.clone()),
            ImageKey::Session(session_id) => self.sessions.get(session_id).cloned(),
        }
    }

    fn prune_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .images
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for token in &expired {
            self.images.pop(token);
        }
        if !expired.is_empty() {
            self.drop_dangling_aliases();
        }
        expired.len()
    }

    fn drop_dangling_aliases(&mut self) {
        let images = &self.images;
        self.sessions.retain(|_, token| images.contains(token));
    }
}

pub struct MemoryImageStore {
    config: ImageStoreConfig,
    entries: Mutex<Entries>,
}

impl MemoryImageStore {
    pub fn new(config: ImageStoreConfig) -> Self {
        Self {
            entries: Mutex::new(Entries {
                images: LruCache::new(config.max_entries),
                sessions: HashMap::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &ImageStoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries.lock().map_err(|_| {
            Error::store_with_context(
                "image store lock poisoned",
                ErrorContext::new().with_source("memory_image_store"),
            )
        })
    }

    fn insert(
        &self,
        token: String,
        image: StoredImage,
        ttl: Option<Duration>,
        session: Option<&str>,
    ) -> Result<()> {
        let ttl = ttl.map_or(self.config.ttl, |t| t.min(self.config.ttl));
        let now = Instant::now();
        let mut entries = self.lock()?;
        // Only live entries compete for LRU slots.
        entries.prune_expired(now);
        let entry = ImageEntry {
            image,
            inserted_at: now,
            last_accessed_at: now,
            expires_at: expiry_deadline(now, ttl),
        };
        if let Some((evicted, old)) = entries.images.push(token.clone(), entry) {
            if evicted != token {
                debug!(
                    token = %evicted,
                    idle_ms = now.duration_since(old.last_accessed_at).as_millis() as u64,
                    "image store evicted least recently used entry"
                );
                entries.drop_dangling_aliases();
            }
        }
        if let Some(session_id) = session {
            entries.sessions.insert(session_id.to_string(), token);
        }
        Ok(())
    }

    /// Age of a live entry, without touching its recency.
    pub fn age_of(&self, key: &ImageKey) -> Option<Duration> {
        let entries = self.lock().ok()?;
        let now = Instant::now();
        let token = entries.token_for(key)?;
        entries
            .images
            .peek(&token)
            .filter(|e| !e.is_expired(now))
            .map(|e| now.duration_since(e.inserted_at))
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new(ImageStoreConfig::default())
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    /// A `Session` key stores the image under a fresh token and points the
    /// session at it.
    async fn set(&self, key: ImageKey, image: StoredImage, ttl: Option<Duration>) -> Result<()> {
        match key {
            ImageKey::Token(token) => self.insert(token, image, ttl, None),
            ImageKey::Session(session_id) => {
                self.insert(Uuid::new_v4().to_string(), image, ttl, Some(&session_id))
            }
        }
    }

    async fn save_for_session(
        &self,
        session_id: &str,
        image: StoredImage,
        ttl: Option<Duration>,
    ) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.insert(token.clone(), image, ttl, Some(session_id))?;
        Ok(token)
    }

    async fn get(&self, key: &ImageKey) -> Result<Option<StoredImage>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let Some(token) = entries.token_for(key) else {
            return Ok(None);
        };
        let live = entries.images.get_mut(&token).map(|entry| {
            (!entry.is_expired(now)).then(|| {
                entry.last_accessed_at = now;
                entry.image.clone()
            })
        });
        match live {
            Some(Some(image)) => return Ok(Some(image)),
            Some(None) => {
                entries.images.pop(&token);
            }
            None => {}
        }
        entries.drop_dangling_aliases();
        Ok(None)
    }

    /// Removing a `Session` key only forgets the alias; the image stays
    /// reachable by its token until it expires or is evicted.
    async fn remove(&self, key: &ImageKey) -> Result<bool> {
        let mut entries = self.lock()?;
        Ok(match key {
            ImageKey::Token(token) => {
                let removed = entries.images.pop(token).is_some();
                if removed {
                    entries.drop_dangling_aliases();
                }
                removed
            }
            ImageKey::Session(session_id) => entries.sessions.remove(session_id).is_some(),
        })
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        Ok(entries.prune_expired(Instant::now()))
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .images
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
