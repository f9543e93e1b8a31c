//! Change feed over a `MemoryStore`'s writes.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

use super::{ChangeEvent, ChangeFeed, FeedEvent};

pub struct MemoryFeed {
    changes: broadcast::Sender<ChangeEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryFeed {
    pub(crate) fn new(changes: broadcast::Sender<ChangeEvent>) -> Self {
        Self {
            changes,
            forwarder: Mutex::new(None),
        }
    }

    fn replace_forwarder(&self, handle: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.forwarder.lock().unwrap_or_else(|e| e.into_inner()),
            handle,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn subscribe(&self) -> mpsc::Receiver<FeedEvent> {
        let (tx, rx) = mpsc::channel(256);
        let mut changes = self.changes.subscribe();

        let handle = tokio::spawn(async move {
            if tx.send(FeedEvent::Subscribed).await.is_err() {
                return;
            }
            loop {
                let event = match changes.recv().await {
                    Ok(change) => FeedEvent::Change(change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory feed lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        self.replace_forwarder(Some(handle));
        rx
    }

    async fn unsubscribe(&self) {
        self.replace_forwarder(None);
    }
}

impl Drop for MemoryFeed {
    fn drop(&mut self) {
        self.replace_forwarder(None);
    }
}
