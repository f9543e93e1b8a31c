//! Presence tracker timing configuration.

use serde::{Deserialize, Serialize};

/// Presence system configuration. All durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Maximum heartbeat age before a user counts as offline.
    pub stale_window_secs: u32,
    pub heartbeat_interval_secs: u32,
    pub sweep_interval_secs: u32,
    /// Fallback snapshot reload cadence. `0` disables polling.
    pub poll_interval_secs: u32,
    /// Probe the presence table before joining.
    pub verify_table_on_start: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_window_secs: 30,
            heartbeat_interval_secs: 10,
            sweep_interval_secs: 30,
            poll_interval_secs: 15,
            verify_table_on_start: true,
        }
    }
}
