use crate::cache::CacheStats;
use crate::resilience::CircuitBreakerSnapshot;

/// Point-in-time view of the client's shared state, facts only.
///
/// Store sizes are `None` when the store could not be read.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub breakers: Vec<CircuitBreakerSnapshot>,
    pub cache: CacheStats,
    pub cache_backend: &'static str,
    pub images: Option<usize>,
    pub sessions: Option<usize>,
    pub sweeps_running: usize,
}
