//! Presence tracker.
//!
//! Owns the join guard, the local roster and the health flag for one client
//! session. Timers and the change feed are driven from [`crate::session`].

mod engine;
mod types;

pub use engine::PresenceTracker;
pub use types::{PresenceEvent, PresenceHealth, SessionState, TrackerConfig};
