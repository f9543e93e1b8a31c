//! Configuration, state, and event types for the presence tracker.

use std::time::Duration;

use crate::record::PresenceRecord;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing for one presence session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum heartbeat age before a user counts as offline.
    pub stale_window: Duration,
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    /// Fallback snapshot reload cadence; `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Probe the table before the first join.
    pub verify_table_on_start: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stale_window: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            poll_interval: Some(Duration::from_secs(15)),
            verify_table_on_start: true,
        }
    }
}

impl TrackerConfig {
    pub(crate) fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stale_window).unwrap_or(chrono::Duration::MAX)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Per-session join state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Joining,
    Active,
    Leaving,
}

/// Whether presence is working, as far as this client can tell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PresenceHealth {
    #[default]
    Ok,
    /// Transient failure or access-policy denial. Cleared by the next success.
    Unavailable(String),
    /// The presence table is missing. Latched for the tracker's lifetime.
    Misconfigured(String),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the tracker for the host UI to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The change feed acknowledged the subscription.
    Connected,
    Disconnected,
    UserOnline(PresenceRecord),
    UserOffline {
        id: String,
        display_name: String,
    },
    RosterRefreshed {
        online_count: usize,
    },
    Unavailable(String),
}
