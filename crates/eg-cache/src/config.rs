//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup builds fresh and nothing is stored.
    pub enable: bool,
    /// Invalidate every entry once when the cache starts.
    pub reset_cache: bool,
    /// Entry lifetime in seconds.
    pub expiry_time: u64,
    /// Liveness bound of a running build in seconds.
    pub build_timeout: u64,
    /// Drop expired entries on every lookup instead of only on access.
    pub eager_sweep: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            reset_cache: false,
            expiry_time: 86_400,
            build_timeout: 600,
            eager_sweep: false,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::default()
        }
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_time)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout)
    }
}
