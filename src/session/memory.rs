use super::shard::{SessionPatch, SessionShard};
use super::SessionStore;
use crate::maintenance::expiry_deadline;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct StoredShard {
    shard: SessionShard,
    expires_at: Instant,
}

/// In-process session store with sliding expiration.
///
/// The merge runs under the store lock, so concurrent upserts to one session
/// are applied one after the other and none is lost.
pub struct MemorySessionStore {
    default_ttl: Duration,
    shards: Mutex<HashMap<String, StoredShard>>,
}

impl MemorySessionStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            shards: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredShard>>> {
        self.shards.lock().map_err(|_| {
            Error::store_with_context(
                "session store lock poisoned",
                ErrorContext::new().with_source("memory_session_store"),
            )
        })
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionShard>> {
        let now = Instant::now();
        let mut shards = self.lock()?;
        let live = match shards.get(session_id) {
            None => return Ok(None),
            Some(stored) => (now <= stored.expires_at).then(|| stored.shard.clone()),
        };
        if live.is_none() {
            shards.remove(session_id);
        }
        Ok(live)
    }

    async fn upsert(
        &self,
        session_id: &str,
        patch: SessionPatch,
        ttl: Option<Duration>,
    ) -> Result<SessionShard> {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut shards = self.lock()?;
        let stored = shards
            .entry(session_id.to_string())
            .or_insert_with(|| StoredShard {
                shard: SessionShard::empty(session_id),
                expires_at: now,
            });
        // An expired shard is not resurrected by a late write.
        if now > stored.expires_at {
            stored.shard = SessionShard::empty(session_id);
        }
        stored.shard.apply(patch);
        stored.expires_at = expiry_deadline(now, ttl);
        Ok(stored.shard.clone())
    }

    async fn clear(&self, session_id: &str) -> Result<bool> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut shards = self.lock()?;
        let before = shards.len();
        shards.retain(|_, s| now <= s.expires_at);
        Ok(before - shards.len())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self.lock()?.values().filter(|s| now <= s.expires_at).count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;
    use tokio_test::assert_ok;

    #[tokio::test(start_paused = true)]
    async fn shard_exists_only_after_a_write() {
        let store = MemorySessionStore::default();
        assert!(store.get("s1").await.unwrap().is_none());
        store
            .upsert("s1", SessionPatch::new().with_intent("cross the road"), None)
            .await
            .unwrap();
        let shard = store.get("s1").await.unwrap().unwrap();
        assert_eq!(shard.session_id, "s1");
        assert_eq!(shard.user_intent.as_deref(), Some("cross the road"));
    }

    #[tokio::test(start_paused = true)]
    async fn every_write_slides_the_expiry() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        store.upsert("s1", SessionPatch::new().with_fact("a"), None).await.unwrap();
        advance(Duration::from_secs(50)).await;
        store.upsert("s1", SessionPatch::new().with_fact("b"), None).await.unwrap();
        advance(Duration::from_secs(50)).await;
        let shard = store.get("s1").await.unwrap().unwrap();
        assert_eq!(shard.facts.len(), 2);
        advance(Duration::from_secs(11)).await;
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn write_after_expiry_starts_fresh() {
        let store = MemorySessionStore::new(Duration::from_secs(10));
        store.upsert("s1", SessionPatch::new().with_fact("old"), None).await.unwrap();
        advance(Duration::from_secs(11)).await;
        let shard = store
            .upsert("s1", SessionPatch::new().with_fact("new"), None)
            .await
            .unwrap();
        assert_eq!(shard.facts.len(), 1);
        assert_eq!(shard.facts[0], "new");
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_ttl_overrides_default() {
        let store = MemorySessionStore::new(Duration::from_secs(600));
        store
            .upsert("s1", SessionPatch::new().with_intent("x"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        advance(Duration::from_secs(6)).await;
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unbounded_ttl_keeps_the_store_usable() {
        let store = MemorySessionStore::new(Duration::MAX);
        assert_ok!(
            store
                .upsert("s1", SessionPatch::new().with_fact("a"), Some(Duration::from_secs(u64::MAX)))
                .await
        );
        let shard = assert_ok!(store.upsert("s1", SessionPatch::new().with_fact("b"), None).await);
        assert_eq!(shard.facts.len(), 2);
        assert!(assert_ok!(store.get("s1").await).is_some());
        assert_eq!(assert_ok!(store.cleanup_expired().await), 0);
    }

    #[tokio::test]
    async fn clear_deletes_the_shard() {
        let store = MemorySessionStore::default();
        store.upsert("s1", SessionPatch::new().with_intent("x"), None).await.unwrap();
        assert!(store.clear("s1").await.unwrap());
        assert!(!store.clear("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_lose_no_qa_pairs() {
        let store = Arc::new(MemorySessionStore::default());
        let handles: Vec<_> = (0..3)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert("s1", SessionPatch::new().with_qa(format!("q{n}"), "a"), None)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        let shard = store.get("s1").await.unwrap().unwrap();
        let mut questions: Vec<_> = shard.recent_qa.iter().map(|qa| qa.question.clone()).collect();
        questions.sort();
        assert_eq!(questions, vec!["q0", "q1", "q2"]);
    }
}
