use super::builder::AssistClientBuilder;
use super::status::StatusSnapshot;
use super::types::{AssistRequest, AssistResponse, InspectResponse, ResolvedImage, TextResponse};
use crate::cache::{ResponseCache, ResponseCacheKey};
use crate::error_kind::ErrorKind;
use crate::image_store::{ImageKey, ImageRef, ImageStore};
use crate::maintenance::SweepTask;
use crate::perf::Stopwatch;
use crate::provider::{AiProvider, ProviderFailure, RequestKind, Signals};
use crate::resilience::{CircuitBreakerRegistry, ClassifiedError, RetryExecutor};
use crate::session::{ContextPacker, SessionPatch, SessionShard, SessionStore};
use crate::telemetry::{TelemetryEntry, TelemetryLogger};
use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Assistant core: one provider behind a circuit breaker, retries, a response
/// cache, an image store and session memory.
///
/// Only provider failures (and requests that carry no usable image) surface
/// as errors. Store and cache problems are logged and degrade to a miss.
pub struct AssistClient {
    pub(crate) provider: Arc<dyn AiProvider>,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) retry: RetryExecutor,
    pub(crate) retry_overrides: HashMap<String, RetryExecutor>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) images: Arc<dyn ImageStore>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) packer: ContextPacker,
    pub(crate) image_ttl: Option<Duration>,
    pub(crate) session_ttl: Option<Duration>,
    pub(crate) telemetry: Arc<dyn TelemetryLogger>,
    pub(crate) sweeps: Mutex<Vec<SweepTask>>,
}

fn invalid_input(message: impl Into<String>) -> Error {
    Error::Provider(ClassifiedError::from_kind(ErrorKind::InvalidInput, message))
}

fn compose_prompt(context: &str, prompt: &str) -> String {
    if context.is_empty() {
        prompt.to_string()
    } else {
        format!("{context}\n\n{prompt}")
    }
}

impl AssistClient {
    pub fn builder(provider: Arc<dyn AiProvider>) -> AssistClientBuilder {
        AssistClientBuilder::new(provider)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn image_store(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Find the image a request refers to.
    ///
    /// An uploaded image is saved once under a fresh token; when the request
    /// has a session, that token also becomes the session's latest image.
    /// `image_ref: "last"` reads the session's latest image back; any other
    /// ref is a token.
    pub async fn resolve_image(&self, request: &AssistRequest) -> Result<ResolvedImage> {
        if let Some(image) = &request.image {
            if image.is_empty() {
                return Err(invalid_input("uploaded image is empty"));
            }
            let saved = match request.session_id.as_deref() {
                Some(session_id) => {
                    self.images
                        .save_for_session(session_id, image.clone(), self.image_ttl)
                        .await
                }
                None => self.images.save(image.clone(), self.image_ttl).await,
            };
            let token = match saved {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(store = self.images.name(), error = %e, "image save failed");
                    None
                }
            };
            return Ok(ResolvedImage {
                image: image.clone(),
                token,
            });
        }

        let reference = request
            .image_ref
            .as_deref()
            .and_then(ImageRef::parse)
            .ok_or_else(|| invalid_input("request carries neither an image nor an image reference"))?;
        let key = match reference {
            ImageRef::Last => {
                let session_id = request
                    .session_id
                    .as_deref()
                    .ok_or_else(|| invalid_input("image reference \"last\" needs a session id"))?;
                ImageKey::Session(session_id.to_string())
            }
            ImageRef::Token(token) => ImageKey::Token(token),
        };
        let found = match self.images.get(&key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(store = self.images.name(), key = %key, error = %e, "image lookup failed; treating as missing");
                None
            }
        };
        match found {
            Some(image) => Ok(ResolvedImage { image, token: None }),
            None => Err(invalid_input(format!(
                "no stored image for {key}; it may have expired, please send the image again"
            ))),
        }
    }

    /// Fast structured pass over the image. Signals are written to the session.
    pub async fn inspect(&self, request: &AssistRequest) -> Result<InspectResponse> {
        let kind = RequestKind::Inspect;
        let sw = Stopwatch::start();
        let resolved = match self.resolve_image(request).await {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.fail(kind, &sw, 0, e).await),
        };
        let key = ResponseCacheKey::derive(&resolved.image.bytes, &request.language, kind);

        let cached = self
            .cache
            .get(&key)
            .await
            .and_then(|raw| serde_json::from_str::<Signals>(&raw).ok());
        let (signals, cache_hit, attempts) = match cached {
            Some(signals) => (signals, true, 0),
            None => {
                let image = &resolved.image;
                let (result, attempts) = self
                    .call_provider(kind, || {
                        self.provider.inspect_image(&image.bytes, &image.mime_type)
                    })
                    .await;
                let signals = match result {
                    Ok(signals) => signals,
                    Err(err) => return Err(self.fail(kind, &sw, attempts, err.into()).await),
                };
                match serde_json::to_string(&signals) {
                    Ok(raw) => self.cache.set(&key, &raw, None).await,
                    Err(e) => warn!(error = %e, "cannot encode signals for the response cache"),
                }
                (signals, false, attempts)
            }
        };

        if let Some(session_id) = request.session_id.as_deref() {
            self.remember(session_id, SessionPatch::new().with_signals(signals.clone()))
                .await;
        }
        self.succeed(kind, &sw, cache_hit, attempts).await;
        Ok(AssistResponse {
            value: signals,
            cache_hit,
            attempts,
            image_token: resolved.token,
            latency: sw.elapsed(),
        })
    }

    /// Free-text scene description. Session context is prepended to `prompt`.
    pub async fn describe(&self, request: &AssistRequest, prompt: &str) -> Result<TextResponse> {
        self.generate(RequestKind::Describe, request, prompt).await
    }

    /// Answer a question about the image and record the exchange in the
    /// session.
    pub async fn answer(&self, request: &AssistRequest, question: &str) -> Result<TextResponse> {
        let response = self.generate(RequestKind::Question, request, question).await?;
        if let Some(session_id) = request.session_id.as_deref() {
            self.remember(session_id, SessionPatch::new().with_qa(question, &response.value))
                .await;
        }
        Ok(response)
    }

    async fn generate(
        &self,
        kind: RequestKind,
        request: &AssistRequest,
        prompt: &str,
    ) -> Result<TextResponse> {
        let sw = Stopwatch::start();
        let resolved = match self.resolve_image(request).await {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.fail(kind, &sw, 0, e).await),
        };
        let mut key = ResponseCacheKey::derive(&resolved.image.bytes, &request.language, kind);
        if kind == RequestKind::Question {
            key = key.with_prompt(prompt);
        }

        if let Some(text) = self.cache.get(&key).await {
            debug!(mode = kind.as_str(), key = %key, "response cache hit");
            self.succeed(kind, &sw, true, 0).await;
            return Ok(AssistResponse {
                value: text,
                cache_hit: true,
                attempts: 0,
                image_token: resolved.token,
                latency: sw.elapsed(),
            });
        }

        let context = self.session_context(request.session_id.as_deref()).await;
        let full_prompt = compose_prompt(&context, prompt);
        let image = &resolved.image;
        let (result, attempts) = self
            .call_provider(kind, || {
                self.provider
                    .generate_response(&image.bytes, &image.mime_type, &full_prompt)
            })
            .await;
        let text = match result {
            Ok(text) => text,
            Err(err) => return Err(self.fail(kind, &sw, attempts, err.into()).await),
        };
        self.cache.set(&key, &text, None).await;
        self.succeed(kind, &sw, false, attempts).await;
        Ok(AssistResponse {
            value: text,
            cache_hit: false,
            attempts,
            image_token: resolved.token,
            latency: sw.elapsed(),
        })
    }

    /// Breaker outside, retries inside. Returns the outcome and the number of
    /// provider attempts made.
    async fn call_provider<T, F, Fut>(
        &self,
        kind: RequestKind,
        operation: F,
    ) -> (std::result::Result<T, ClassifiedError>, u32)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderFailure>>,
    {
        let dependency = self.provider.name();
        let breaker = self.breakers.get_or_create(dependency);
        let retry = self.retry_overrides.get(dependency).unwrap_or(&self.retry);
        let attempts = AtomicU32::new(0);
        let result = breaker
            .call(|| {
                retry.execute(kind.as_str(), || {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    operation()
                })
            })
            .await;
        (result, attempts.load(Ordering::Relaxed))
    }

    /// Packed context for a session, or empty when there is none.
    pub async fn session_context(&self, session_id: Option<&str>) -> String {
        let Some(session_id) = session_id else {
            return String::new();
        };
        match self.sessions.get(session_id).await {
            Ok(shard) => self.packer.pack(shard.as_ref()),
            Err(e) => {
                warn!(store = self.sessions.name(), session = session_id, error = %e, "session read failed; continuing without context");
                String::new()
            }
        }
    }

    /// Merge `patch` into the session. `None` if the store failed.
    pub async fn remember(&self, session_id: &str, patch: SessionPatch) -> Option<SessionShard> {
        match self.sessions.upsert(session_id, patch, self.session_ttl).await {
            Ok(shard) => Some(shard),
            Err(e) => {
                warn!(store = self.sessions.name(), session = session_id, error = %e, "session write failed");
                None
            }
        }
    }

    /// Forget a session's memory and its latest-image pointer.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        let cleared = match self.sessions.clear(session_id).await {
            Ok(cleared) => cleared,
            Err(e) => {
                warn!(store = self.sessions.name(), session = session_id, error = %e, "session clear failed");
                false
            }
        };
        if let Err(e) = self
            .images
            .remove(&ImageKey::Session(session_id.to_string()))
            .await
        {
            warn!(store = self.images.name(), session = session_id, error = %e, "session image removal failed");
        }
        cleared
    }

    pub async fn status(&self) -> StatusSnapshot {
        let sweeps_running = self
            .sweeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.is_running())
            .count();
        StatusSnapshot {
            breakers: self.breakers.snapshots(),
            cache: self.cache.stats(),
            cache_backend: self.cache.backend_name(),
            images: self.images.len().await.ok(),
            sessions: self.sessions.len().await.ok(),
            sweeps_running,
        }
    }

    /// Stop background sweeps and close the telemetry sink.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.sweeps.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.shutdown().await;
        }
        if let Err(e) = self.telemetry.close().await {
            warn!(error = %e, "telemetry sink close failed");
        }
    }

    async fn succeed(&self, kind: RequestKind, sw: &Stopwatch, cache_hit: bool, attempts: u32) {
        let entry = TelemetryEntry::new(kind, self.provider.name())
            .with_latency_ms(sw.elapsed_ms())
            .with_cache_hit(cache_hit)
            .with_attempts(attempts);
        self.emit(entry).await;
    }

    async fn fail(&self, kind: RequestKind, sw: &Stopwatch, attempts: u32, err: Error) -> Error {
        let error_kind = err
            .as_classified()
            .map(|c| c.kind)
            .unwrap_or(ErrorKind::Unknown);
        debug!(mode = kind.as_str(), kind = %error_kind, attempts, error = %err, "request failed");
        let entry = TelemetryEntry::new(kind, self.provider.name())
            .with_latency_ms(sw.elapsed_ms())
            .with_error(error_kind)
            .with_attempts(attempts);
        self.emit(entry).await;
        err
    }

    async fn emit(&self, entry: TelemetryEntry) {
        if let Err(e) = self.telemetry.log(entry).await {
            warn!(error = %e, "telemetry write failed");
        }
    }
}
