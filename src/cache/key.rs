//! Content-addressed cache keys.

use crate::provider::RequestKind;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

/// Bytes of the image that take part in the fingerprint.
pub const FINGERPRINT_PREFIX_BYTES: usize = 64 * 1024;

/// Fast non-cryptographic fingerprint over a bounded prefix of the image.
///
/// The full length seeds the hash, so two captures sharing a prefix but
/// differing in size still get different fingerprints.
pub fn image_fingerprint(image: &[u8]) -> u64 {
    let prefix = &image[..image.len().min(FINGERPRINT_PREFIX_BYTES)];
    xxh64(prefix, image.len() as u64)
}

fn text_fingerprint(text: &str) -> u64 {
    xxh64(text.trim().to_lowercase().as_bytes(), 0)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseCacheKey {
    pub hash: String,
    pub kind: RequestKind,
    pub language: String,
}

impl ResponseCacheKey {
    /// Key for `(image, language, kind)`.
    pub fn derive(image: &[u8], language: &str, kind: RequestKind) -> Self {
        let language = language.trim().to_lowercase();
        let hash = format!("{}:{}:{:016x}", kind.as_str(), language, image_fingerprint(image));
        Self {
            hash,
            kind,
            language,
        }
    }

    /// Mix the user's question into the key so different questions about the
    /// same frame are cached separately.
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.hash = format!("{}:{:016x}", self.hash, text_fingerprint(prompt));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for ResponseCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}
