use super::core::AssistClient;
use crate::cache::{CacheBackend, MemoryCache, ResponseCache};
use crate::config::CoreConfig;
use crate::image_store::{ImageStore, MemoryImageStore};
use crate::maintenance::SweepTask;
use crate::provider::AiProvider;
use crate::resilience::{CircuitBreakerRegistry, RetryExecutor};
use crate::session::{ContextPacker, MemorySessionStore, SessionStore};
use crate::telemetry::TelemetryLogger;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Builder for [`AssistClient`].
///
/// Everything except the provider has an in-memory default driven by
/// [`CoreConfig`]. Stores and the breaker registry can be injected so several
/// clients share them.
pub struct AssistClientBuilder {
    provider: Arc<dyn AiProvider>,
    config: CoreConfig,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    cache_backend: Option<Box<dyn CacheBackend>>,
    images: Option<Arc<dyn ImageStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    telemetry: Arc<dyn TelemetryLogger>,
    background_sweeps: bool,
}

impl AssistClientBuilder {
    pub fn new(provider: Arc<dyn AiProvider>) -> Self {
        Self {
            provider,
            config: CoreConfig::default(),
            breakers: None,
            cache_backend: None,
            images: None,
            sessions: None,
            telemetry: crate::telemetry::noop_telemetry(),
            background_sweeps: true,
        }
    }

    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Share breakers with other clients calling the same dependencies.
    pub fn circuit_breakers(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    pub fn cache_backend(mut self, backend: Box<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.images = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Inject a telemetry sink. Default is a no-op sink.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetryLogger>) -> Self {
        self.telemetry = sink;
        self
    }

    /// Spawn expiry sweeps for the cache and stores (default on). Requires a
    /// tokio runtime at `build` time; without one the sweeps are skipped.
    pub fn background_sweeps(mut self, enable: bool) -> Self {
        self.background_sweeps = enable;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<AssistClient> {
        let config = self.config;
        config.validate()?;

        let breakers = self.breakers.unwrap_or_else(|| {
            Arc::new(CircuitBreakerRegistry::new(
                config.circuit_breaker.to_config(),
            ))
        });
        let retry = RetryExecutor::new(config.retry.to_policy());
        let retry_overrides: HashMap<String, RetryExecutor> = config
            .retry_overrides
            .iter()
            .map(|(name, settings)| (name.clone(), RetryExecutor::new(settings.to_policy())))
            .collect();

        let backend = self
            .cache_backend
            .unwrap_or_else(|| Box::new(MemoryCache::new(config.response_cache.max_entries)));
        let cache = Arc::new(ResponseCache::new(
            config.response_cache.to_config(),
            backend,
        ));
        let images: Arc<dyn ImageStore> = match self.images {
            Some(store) => store,
            None => Arc::new(MemoryImageStore::new(config.image_store.to_config()?)),
        };
        let sessions: Arc<dyn SessionStore> = self
            .sessions
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new(config.session.ttl())));

        let mut sweeps = Vec::new();
        if self.background_sweeps {
            if tokio::runtime::Handle::try_current().is_ok() {
                sweeps = spawn_sweeps(&config, &cache, &images, &sessions);
            } else {
                warn!("no tokio runtime at build time; background sweeps disabled");
            }
        }

        Ok(AssistClient {
            provider: self.provider,
            breakers,
            retry,
            retry_overrides,
            cache,
            images,
            sessions,
            packer: ContextPacker::new(config.session.context_budget_chars),
            image_ttl: Some(Duration::from_secs(config.image_store.ttl_secs)),
            session_ttl: Some(config.session.ttl()),
            telemetry: self.telemetry,
            sweeps: Mutex::new(sweeps),
        })
    }
}

fn spawn_sweeps(
    config: &CoreConfig,
    cache: &Arc<ResponseCache>,
    images: &Arc<dyn ImageStore>,
    sessions: &Arc<dyn SessionStore>,
) -> Vec<SweepTask> {
    let mut tasks = Vec::new();
    if let Some(interval) = config.response_cache.sweep_interval() {
        let cache = cache.clone();
        tasks.push(SweepTask::spawn("response_cache", interval, move || {
            let cache = cache.clone();
            async move { cache.cleanup().await }
        }));
    }
    if let Some(interval) = config.image_store.sweep_interval() {
        let images = images.clone();
        tasks.push(SweepTask::spawn("image_store", interval, move || {
            let images = images.clone();
            async move {
                images.cleanup_expired().await.unwrap_or_else(|e| {
                    warn!(store = images.name(), error = %e, "image sweep failed");
                    0
                })
            }
        }));
    }
    if let Some(interval) = config.session.sweep_interval() {
        let sessions = sessions.clone();
        tasks.push(SweepTask::spawn("session_store", interval, move || {
            let sessions = sessions.clone();
            async move {
                sessions.cleanup_expired().await.unwrap_or_else(|e| {
                    warn!(store = sessions.name(), error = %e, "session sweep failed");
                    0
                })
            }
        }));
    }
    tasks
}
