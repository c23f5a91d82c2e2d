//! Image store: lets a client refer to an image it already uploaded.
//!
//! Follow-up questions usually concern the frame the user just captured.
//! Instead of resending several megabytes per question, the client sends
//! `imageRef: "last"` (or a token it received earlier) and the image is
//! resolved from here.
//!
//! Two addressing modes share one store:
//! - [`ImageKey::Token`]: an opaque token assigned at insertion by [`ImageStore::save`]
//! - [`ImageKey::Session`]: the most recent image uploaded in a session, an
//!   alias onto that image's token
//!
//! [`MemoryImageStore`] bounds both entry count (LRU eviction) and entry age
//! (TTL). A durable backend can implement [`ImageStore`] without changing callers.

mod memory;

pub use memory::{ImageStoreConfig, MemoryImageStore};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    Token(String),
    Session(String),
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(t) => write!(f, "token:{t}"),
            Self::Session(s) => write!(f, "session:{s}"),
        }
    }
}

/// Image bytes plus the MIME type the provider needs to decode them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl StoredImage {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How a request refers to a previously uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Most recent image of the request's session.
    Last,
    Token(String),
}

impl ImageRef {
    /// `"last"` (any case) means the session's latest image; anything else
    /// non-empty is a token.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if raw.eq_ignore_ascii_case("last") {
            Some(Self::Last)
        } else {
            Some(Self::Token(raw.to_string()))
        }
    }
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Insert or refresh `key` at the most-recently-used position. A
    /// `Session` key stores the image under a fresh token and aliases it.
    async fn set(&self, key: ImageKey, image: StoredImage, ttl: Option<Duration>) -> Result<()>;

    /// Live entry for `key`; counts as a use. Expired entries are removed and
    /// reported absent.
    async fn get(&self, key: &ImageKey) -> Result<Option<StoredImage>>;

    /// A `Session` key forgets only the alias.
    async fn remove(&self, key: &ImageKey) -> Result<bool>;

    /// Remove every entry past its TTL regardless of recency.
    async fn cleanup_expired(&self) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    fn name(&self) -> &'static str;

    /// Store under a fresh opaque token and return it.
    async fn save(&self, image: StoredImage, ttl: Option<Duration>) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.set(ImageKey::Token(token.clone()), image, ttl).await?;
        Ok(token)
    }

    /// Store under a fresh token, make it the session's latest image and
    /// return the token. Both addresses resolve to the same entry.
    async fn save_for_session(
        &self,
        session_id: &str,
        image: StoredImage,
        ttl: Option<Duration>,
    ) -> Result<String>;

    async fn latest_for_session(&self, session_id: &str) -> Result<Option<StoredImage>> {
        self.get(&ImageKey::Session(session_id.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_parsing() {
        assert_eq!(ImageRef::parse("last"), Some(ImageRef::Last));
        assert_eq!(ImageRef::parse(" LAST "), Some(ImageRef::Last));
        assert_eq!(
            ImageRef::parse("9b2c"),
            Some(ImageRef::Token("9b2c".to_string()))
        );
        assert_eq!(ImageRef::parse("   "), None);
    }

    #[test]
    fn keys_render_with_their_namespace() {
        assert_eq!(ImageKey::Token("a".into()).to_string(), "token:a");
        assert_eq!(ImageKey::Session("a".into()).to_string(), "session:a");
    }
}
