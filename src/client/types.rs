use crate::image_store::StoredImage;
use crate::provider::Signals;
use bytes::Bytes;
use std::time::Duration;

/// One assistant request as seen by the core.
///
/// An explicit image wins over `image_ref`. Without either, the request
/// fails with `INVALID_INPUT`.
#[derive(Debug, Clone, Default)]
pub struct AssistRequest {
    pub session_id: Option<String>,
    pub image: Option<StoredImage>,
    /// `"last"` for the session's most recent image, otherwise a token
    /// returned by an earlier request.
    pub image_ref: Option<String>,
    pub language: String,
}

impl AssistRequest {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_image(mut self, bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        self.image = Some(StoredImage::new(bytes, mime_type));
        self
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }
}

/// The image a request will be answered about.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub image: StoredImage,
    /// Token of a freshly uploaded image; `None` when the image came from the
    /// store or could not be saved.
    pub token: Option<String>,
}

/// Successful assistant result plus the facts a handler needs to report it.
#[derive(Debug, Clone)]
pub struct AssistResponse<T> {
    pub value: T,
    pub cache_hit: bool,
    /// Provider attempts made; zero on a cache hit.
    pub attempts: u32,
    pub image_token: Option<String>,
    pub latency: Duration,
}

pub type InspectResponse = AssistResponse<Signals>;
pub type TextResponse = AssistResponse<String>;
