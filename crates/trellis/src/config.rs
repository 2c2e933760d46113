//! Engine configuration.

use std::time::Duration;

use crate::scheduler::SchedulerBackend;

/// Tunables for one engine instance.
///
/// The defaults suit a long-running server process; tests typically switch
/// the scheduler to [`SchedulerBackend::Manual`] and drive sweeps by hand.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cached permission data older than this is evicted by the cache sweep.
    pub cache_max_age: Duration,

    /// How often expired nodes and edges are swept from loaded holders.
    pub expiry_sweep_interval: Duration,

    /// How often stale cache entries are swept.
    pub cache_sweep_interval: Duration,

    /// Which scheduler backend runs sweeps and listeners.
    pub scheduler: SchedulerBackend,

    /// Whether local mutations are broadcast to the cluster bus.
    pub broadcast_invalidations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_age: Duration::from_secs(600),
            expiry_sweep_interval: Duration::from_secs(60),
            cache_sweep_interval: Duration::from_secs(120),
            scheduler: SchedulerBackend::Tokio,
            broadcast_invalidations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_max_age, Duration::from_secs(600));
        assert_eq!(config.scheduler, SchedulerBackend::Tokio);
        assert!(config.broadcast_invalidations);
    }
}
