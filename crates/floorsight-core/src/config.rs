//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one view coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Default per-source fetch timeout in seconds (sources may override)
    pub default_timeout_secs: u64,
    /// Cap on concurrently running fetches
    pub max_in_flight: usize,
    /// Whether a refresh that invalidates the analysis re-triggers it
    /// automatically once all inputs are ready
    pub auto_analyze: bool,
}

impl CoordinatorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a default fetch timeout
    #[inline]
    #[must_use]
    pub fn with_default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// With a concurrent-fetch cap
    #[inline]
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    /// With automatic analysis triggering on invalidation
    #[inline]
    #[must_use]
    pub fn with_auto_analyze(mut self, auto: bool) -> Self {
        self.auto_analyze = auto;
        self
    }

    /// The default timeout as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_in_flight: 8,
            auto_analyze: false,
        }
    }
}
