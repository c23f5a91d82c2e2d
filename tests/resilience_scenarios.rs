//! Retry and circuit breaker behaviour as seen through AssistClient.

mod common;

use common::{bad_request, client_with, jpeg, kind_of, rate_limited, unavailable, ScriptedProvider};
use nadar_core::resilience::CircuitState;
use nadar_core::telemetry::InMemoryTelemetry;
use nadar_core::{AssistClient, AssistRequest, CoreConfig, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

fn single_attempt() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.retry.max_attempts = 1;
    config
}

fn upload(seed: u8) -> AssistRequest {
    AssistRequest::new("en").with_image(jpeg(1024, seed), "image/jpeg")
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    let provider = Arc::new(
        ScriptedProvider::new("vision")
            .then(Err(rate_limited()))
            .then(Err(rate_limited()))
            .then(Ok("The bus number is 42.")),
    );
    let client = client_with(provider.clone(), CoreConfig::default());

    let response = client.describe(&upload(1), "Read the bus number.").await.unwrap();
    assert_eq!(response.value, "The bus number is 42.");
    assert_eq!(response.attempts, 3);

    let times = provider.call_times();
    assert_eq!(times.len(), 3);
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(first_gap >= Duration::from_millis(500) && first_gap < Duration::from_millis(550));
    assert!(second_gap >= Duration::from_millis(1000) && second_gap < Duration::from_millis(1050));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_the_last_error() {
    let provider = Arc::new(ScriptedProvider::new("vision").always(Err(unavailable())));
    let client = client_with(provider.clone(), CoreConfig::default());

    let err = client.describe(&upload(2), "Describe.").await.unwrap_err();
    let classified = err.as_classified().unwrap();
    assert_eq!(classified.kind, ErrorKind::ServiceUnavailable);
    assert!(classified.retryable);
    assert_eq!(provider.calls(), 3);

    // One exhausted retry loop is one breaker failure.
    let snapshot = &client.breakers().snapshots()[0];
    assert_eq!(snapshot.recent_failures, 1);
    assert_eq!(snapshot.state, CircuitState::Closed);
}

#[tokio::test]
async fn test_non_retryable_error_stops_after_first_attempt() {
    let provider = Arc::new(ScriptedProvider::new("vision").always(Err(bad_request())));
    let client = client_with(provider.clone(), CoreConfig::default());

    let err = client.answer(&upload(3), "What is this?").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::InvalidInput);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_breaker_opens_after_five_failures() {
    let telemetry = Arc::new(InMemoryTelemetry::new(16));
    let provider = Arc::new(ScriptedProvider::new("vision").always(Err(unavailable())));
    let client = AssistClient::builder(provider.clone())
        .config(single_attempt())
        .telemetry(telemetry.clone())
        .background_sweeps(false)
        .build()
        .unwrap();

    for seed in 0..5 {
        let err = client.describe(&upload(seed), "Describe.").await.unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::ServiceUnavailable);
    }
    assert_eq!(provider.calls(), 5);
    assert_eq!(client.breakers().get_or_create("vision").state(), CircuitState::Open);

    let err = client.describe(&upload(9), "Describe.").await.unwrap_err();
    let classified = err.as_classified().unwrap();
    assert_eq!(classified.kind, ErrorKind::CircuitOpen);
    assert!(!classified.retryable);
    assert_eq!(provider.calls(), 5);

    let last = telemetry.entries().pop().unwrap();
    assert_eq!(last.error_kind, Some(ErrorKind::CircuitOpen));
    assert_eq!(last.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_half_open() {
    let provider = Arc::new(
        ScriptedProvider::new("vision")
            .then(Err(unavailable()))
            .then(Err(unavailable()))
            .always(Ok("All clear.")),
    );
    let mut config = single_attempt();
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.recovery_timeout_secs = 30;
    let client = client_with(provider.clone(), config);
    let breaker = client.breakers().get_or_create("vision");

    for seed in 0..2 {
        let _ = client.describe(&upload(seed), "Describe.").await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(10)).await;
    let err = client.describe(&upload(10), "Describe.").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::CircuitOpen);

    tokio::time::advance(Duration::from_secs(21)).await;
    client.describe(&upload(11), "Describe.").await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    client.describe(&upload(12), "Describe.").await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn test_invalid_input_does_not_trip_breaker() {
    let provider = Arc::new(ScriptedProvider::new("vision").always(Err(bad_request())));
    let mut config = single_attempt();
    config.circuit_breaker.failure_threshold = 2;
    let client = client_with(provider.clone(), config);

    for seed in 0..4 {
        let _ = client.describe(&upload(seed), "Describe.").await;
    }
    assert_eq!(provider.calls(), 4);
    assert_eq!(client.breakers().get_or_create("vision").state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out_each_attempt() {
    let provider = Arc::new(ScriptedProvider::new("vision").with_delay(Duration::from_secs(60)));
    let mut config = CoreConfig::default();
    config.retry.max_attempts = 2;
    config.retry.per_attempt_timeout_ms = 100;
    let client = client_with(provider.clone(), config);

    let err = client.describe(&upload(4), "Describe.").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Timeout);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_dependency_retry_override_applies_by_provider_name() {
    let provider = Arc::new(ScriptedProvider::new("speech").always(Err(rate_limited())));
    let config = CoreConfig::from_yaml_str(
        r#"
retry:
  max_attempts: 5
  base_delay_ms: 1
  max_delay_ms: 2
retry_overrides:
  speech:
    max_attempts: 2
    base_delay_ms: 1
    max_delay_ms: 2
"#,
    )
    .unwrap();
    let client = client_with(provider.clone(), config);

    let err = client.describe(&upload(5), "Describe.").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::RateLimit);
    assert_eq!(provider.calls(), 2);
}
