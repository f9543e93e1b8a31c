//! Push-based change feed for the presence table.
//!
//! The session owns the subscription: it calls [`ChangeFeed::subscribe`] on
//! start and [`ChangeFeed::unsubscribe`] on teardown.

mod memory;
mod realtime;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::record::PresenceRecord;

pub use memory::MemoryFeed;
pub use realtime::RealtimeFeed;

/// A row-level change on the presence table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(PresenceRecord),
    Update(PresenceRecord),
    Delete { id: String },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => &r.id,
            ChangeEvent::Delete { id } => id,
        }
    }
}

/// What a feed subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The subscription was acknowledged; changes will flow.
    Subscribed,
    /// The subscription dropped. Changes may be missed until `Subscribed`.
    Unsubscribed { reason: String },
    Change(ChangeEvent),
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Start a subscription. The receiver closes when the feed is released.
    async fn subscribe(&self) -> mpsc::Receiver<FeedEvent>;

    /// Release the subscription and any background tasks behind it.
    async fn unsubscribe(&self);
}
