//! # nadar-core
//!
//! Resilience and caching core for the Nadar accessibility assistant.
//!
//! ## Overview
//!
//! Request handlers hand images and questions to this crate; it decides
//! whether the AI provider needs to be called at all, and if so, how to call
//! it safely. Everything around it (HTTP routes, prompt templates, vendor
//! SDKs) lives outside.
//!
//! - **Circuit breaking**: one breaker per dependency, fail fast while it is unhealthy
//! - **Retries**: exponential backoff with per-attempt timeouts
//! - **Response cache**: content-addressed by image fingerprint, language and request kind
//! - **Image store**: LRU + TTL, so follow-ups can say "the last image" instead of resending it
//! - **Session memory**: rolling facts and Q&A packed into a bounded prompt preamble
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nadar_core::provider::{AiProvider, ProviderFailure, Signals};
//! use nadar_core::{AssistClient, AssistRequest, CoreConfig};
//! use std::sync::Arc;
//!
//! struct Vision;
//!
//! #[async_trait::async_trait]
//! impl AiProvider for Vision {
//!     async fn inspect_image(&self, _: &[u8], _: &str) -> Result<Signals, ProviderFailure> {
//!         Ok(Signals::default())
//!     }
//!     async fn generate_response(&self, _: &[u8], _: &str, _: &str) -> Result<String, ProviderFailure> {
//!         Ok("A door is ahead on your left.".into())
//!     }
//!     fn name(&self) -> &str {
//!         "vision"
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> nadar_core::Result<()> {
//!     let mut config = CoreConfig::from_file("nadar.yaml")?;
//!     config.apply_env_overrides()?;
//!     let client = AssistClient::builder(Arc::new(Vision)).config(config).build()?;
//!
//!     let jpeg = std::fs::read("frame.jpg")?;
//!     let first = AssistRequest::new("en").with_session("s1").with_image(jpeg, "image/jpeg");
//!     client.describe(&first, "Describe the scene.").await?;
//!
//!     let follow_up = AssistRequest::new("en").with_session("s1").with_image_ref("last");
//!     let answer = client.answer(&follow_up, "Is the door open?").await?;
//!     println!("{}", answer.value);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`AssistClient`] and its builder |
//! | [`resilience`] | Error classification, retry executor, circuit breakers |
//! | [`cache`] | Response cache with pluggable backends |
//! | [`image_store`] | Token- and session-addressed image storage |
//! | [`session`] | Session memory and context packing |
//! | [`provider`] | The abstract AI provider boundary |
//! | [`telemetry`] | Write-only request telemetry sinks |
//! | [`config`] | YAML + environment configuration |

pub mod cache;
pub mod client;
pub mod config;
pub mod error_kind;
pub mod image_store;
pub mod maintenance;
pub mod perf;
pub mod provider;
pub mod resilience;
pub mod session;
pub mod telemetry;

// Re-export main types for convenience
pub use client::{AssistClient, AssistClientBuilder, AssistRequest, AssistResponse};
pub use config::CoreConfig;
pub use error_kind::ErrorKind;
pub use provider::{AiProvider, ProviderFailure, RequestKind, Signals};
pub use resilience::ClassifiedError;
pub use telemetry::{TelemetryEntry, TelemetryLogger};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
