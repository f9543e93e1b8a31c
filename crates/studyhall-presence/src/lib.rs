//! Online-user presence for studyhall.
//!
//! Each client session keeps one heartbeat row in a shared `online_users`
//! table, cooperatively sweeps stale rows, and mirrors the table into a local
//! roster through a push change feed plus a fallback snapshot poll.

pub mod clock;
pub mod diagnostics;
pub mod feed;
pub mod identity;
pub mod realtime;
pub mod record;
pub mod roster;
pub mod session;
pub mod store;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{check_table, CheckOutcome, CheckStep, TableReport, PROBE_USER_ID};
pub use feed::{ChangeEvent, ChangeFeed, FeedEvent, MemoryFeed, RealtimeFeed};
pub use identity::{AuthClient, AuthError, Principal};
pub use realtime::RealtimeConfig;
pub use record::PresenceRecord;
pub use roster::{Roster, RosterChange};
pub use session::PresenceSession;
pub use store::{build_http_client, MemoryStore, PresenceStore, RestStore, StoreError};
pub use tracker::{PresenceEvent, PresenceHealth, PresenceTracker, SessionState, TrackerConfig};
