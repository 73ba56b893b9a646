//! Configuration Module
//!
//! Settings for the reaper pool. Embedding applications deserialize this
//! from their own configuration; nothing is read from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between sweep passes in milliseconds
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 500;

/// Reaper pool configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pause between two sweep passes in milliseconds
    pub sweep_interval_ms: u64,
}

impl PoolConfig {
    /// Creates a config with the given sweep interval.
    ///
    /// The interval is kept at millisecond granularity: sub-millisecond parts
    /// are dropped (and a zero result is clamped to 1 ms by
    /// [`sweep_interval`](Self::sweep_interval)); intervals beyond `u64::MAX`
    /// milliseconds saturate.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            sweep_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the sweep interval, never shorter than one millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}
