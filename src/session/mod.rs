//! Rolling session memory.
//!
//! Each session keeps a small, recency-biased record: the latest scene
//! signals, the user's inferred intent, up to three distinct facts and the
//! last three Q&A pairs. [`ContextPacker`] turns that record into a bounded
//! string that is prepended to the next prompt, so prompt size stays flat no
//! matter how long the conversation runs.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`SessionShard`] | Per-session record |
//! | [`SessionPatch`] | Partial update merged by `upsert` |
//! | [`SessionStore`] | Storage trait; sliding TTL on every write |
//! | [`MemorySessionStore`] | In-process backend |
//! | [`ContextPacker`] | Budgeted, priority-ordered rendering |

mod context;
mod memory;
mod shard;

pub use context::{ContextPacker, DEFAULT_CONTEXT_BUDGET_CHARS};
pub use memory::MemorySessionStore;
pub use shard::{
    Preferences, QaPair, SessionPatch, SessionShard, Verbosity, MAX_FACTS, MAX_RECENT_QA,
};

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionShard>>;

    /// Merge `patch` into the session's shard, creating it if needed, and
    /// restart its TTL (`None` uses the store default). Returns the merged shard.
    async fn upsert(
        &self,
        session_id: &str,
        patch: SessionPatch,
        ttl: Option<Duration>,
    ) -> Result<SessionShard>;

    async fn clear(&self, session_id: &str) -> Result<bool>;

    async fn cleanup_expired(&self) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    fn name(&self) -> &'static str;
}
