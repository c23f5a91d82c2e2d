//! Response cache: skips repeated generation for the same frame.
//!
//! Keys are content-addressed: a fast fingerprint over a bounded prefix of the
//! image bytes, combined with the target language and the request kind. A user
//! re-asking about the same frame gets the stored answer instead of a new
//! model call.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | TTL-aware front end with hit/miss statistics |
//! | [`CacheConfig`] | TTL (default five minutes), size limit, key prefix |
//! | [`CacheBackend`] | Storage trait; swap in an external KV store here |
//! | [`MemoryCache`] | In-process backend with lazy expiry |
//! | [`NullCache`] | Backend that disables caching |
//! | [`ResponseCacheKey`] | Composite content-addressed key |
//!
//! Failures are never cached.
//!
//! ```rust
//! use nadar_core::cache::{CacheConfig, MemoryCache, ResponseCache, ResponseCacheKey};
//! use nadar_core::provider::RequestKind;
//!
//! # async fn demo() {
//! let cache = ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(500)));
//! let key = ResponseCacheKey::derive(b"...jpeg...", "en", RequestKind::Describe);
//! cache.set(&key, "A pedestrian crossing ahead.", None).await;
//! assert!(cache.get(&key).await.is_some());
//! # }
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{image_fingerprint, ResponseCacheKey, FINGERPRINT_PREFIX_BYTES};
pub use manager::{CacheConfig, CacheStats, ResponseCache};
