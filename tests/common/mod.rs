#![allow(dead_code)]

use async_trait::async_trait;
use nadar_core::provider::{AiProvider, ProviderFailure, Signals};
use nadar_core::{AssistClient, CoreConfig, Error, ErrorKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Provider double that replays a script of outcomes, then repeats a fallback.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Result<String, ProviderFailure>>>,
    fallback: Result<String, ProviderFailure>,
    delay: Duration,
    signals: Signals,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
    prompts: Mutex<Vec<String>>,
    image_sizes: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Ok("There is a crosswalk ahead.".to_string()),
            delay: Duration::ZERO,
            signals: Signals::default(),
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            image_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, outcome: Result<&str, ProviderFailure>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(outcome.map(str::to_string));
        self
    }

    pub fn always(mut self, outcome: Result<&str, ProviderFailure>) -> Self {
        self.fallback = outcome.map(str::to_string);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = signals;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn image_sizes(&self) -> Vec<usize> {
        self.image_sizes.lock().unwrap().clone()
    }

    async fn next(&self, image: &[u8], prompt: Option<&str>) -> Result<String, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.image_sizes.lock().unwrap().push(image.len());
        if let Some(prompt) = prompt {
            self.prompts.lock().unwrap().push(prompt.to_string());
        }
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        outcome
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    async fn inspect_image(&self, image: &[u8], _mime_type: &str) -> Result<Signals, ProviderFailure> {
        self.next(image, None).await.map(|_| self.signals.clone())
    }

    async fn generate_response(
        &self,
        image: &[u8],
        _mime_type: &str,
        prompt: &str,
    ) -> Result<String, ProviderFailure> {
        self.next(image, Some(prompt)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn rate_limited() -> ProviderFailure {
    ProviderFailure::http(429, "Too many requests")
}

pub fn unavailable() -> ProviderFailure {
    ProviderFailure::http(503, "The model is overloaded")
}

pub fn bad_request() -> ProviderFailure {
    ProviderFailure::http(400, "Image could not be decoded")
}

pub fn client_with(provider: Arc<ScriptedProvider>, config: CoreConfig) -> AssistClient {
    AssistClient::builder(provider)
        .config(config)
        .background_sweeps(false)
        .build()
        .expect("valid test config")
}

pub fn kind_of(err: &Error) -> ErrorKind {
    err.as_classified()
        .map(|c| c.kind)
        .unwrap_or_else(|| panic!("not a classified error: {err}"))
}

pub fn jpeg(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
