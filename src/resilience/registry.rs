//! One circuit breaker per named dependency.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Owns the breakers for a process. Construct one and hand it to whatever
/// issues AI calls; breakers are created lazily on first use of a name.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Use a dedicated config for one dependency.
    pub fn with_override(mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let cfg = self
                    .overrides
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                Arc::new(CircuitBreaker::new(name, cfg))
            })
            .clone()
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut snapshots: Vec<_> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    #[test]
    fn same_name_shares_one_breaker() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("gemini");
        let b = registry.get_or_create("gemini");
        assert!(Arc::ptr_eq(&a, &b));
        let other = registry.get_or_create("tts");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn overrides_apply_per_dependency() {
        let registry = CircuitBreakerRegistry::default().with_override(
            "tts",
            CircuitBreakerConfig::new().with_failure_threshold(1),
        );
        let tts = registry.get_or_create("tts");
        tts.on_failure();
        assert_eq!(tts.state(), CircuitState::Open);

        let vision = registry.get_or_create("vision");
        vision.on_failure();
        assert_eq!(vision.state(), CircuitState::Closed);

        let names: Vec<_> = registry.snapshots().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["tts".to_string(), "vision".to_string()]);
    }
}
