//! Change feed backed by Supabase Realtime `postgres_changes`.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ChangeFeed, FeedEvent};
use crate::realtime::{ChannelConfig, PostgresChangesFilter, RealtimeClient, RealtimeConfig, RealtimeEvent};

pub struct RealtimeFeed {
    config: RealtimeConfig,
    channel: String,
    table: String,
    client: Mutex<Option<RealtimeClient>>,
    translator: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeFeed {
    pub fn new(config: RealtimeConfig, channel: &str, table: &str) -> Self {
        Self {
            config,
            channel: channel.to_string(),
            table: table.to_string(),
            client: Mutex::new(None),
            translator: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self) -> mpsc::Receiver<FeedEvent> {
        // One live subscription per feed.
        self.unsubscribe().await;

        let (feed_tx, feed_rx) = mpsc::channel(256);
        let (client, rt_rx) = RealtimeClient::connect(self.config.clone());
        client
            .join_channel(
                &self.channel,
                ChannelConfig {
                    postgres_changes: vec![PostgresChangesFilter::all_on(&self.table)],
                    access_token: self.config.access_token.clone(),
                },
            )
            .await;

        let handle = tokio::spawn(translate(rt_rx, feed_tx, self.channel.clone()));
        *self.client.lock().await = Some(client);
        *self.translator.lock().await = Some(handle);
        feed_rx
    }

    async fn unsubscribe(&self) {
        if let Some(handle) = self.translator.lock().await.take() {
            handle.abort();
        }
        if let Some(client) = self.client.lock().await.take() {
            client.leave_channel(&self.channel).await;
            client.disconnect().await;
        }
    }
}

/// Background task that translates `RealtimeEvent`s into `FeedEvent`s.
async fn translate(
    mut rt_rx: mpsc::Receiver<RealtimeEvent>,
    feed_tx: mpsc::Sender<FeedEvent>,
    channel: String,
) {
    while let Some(rt_event) = rt_rx.recv().await {
        let event = match rt_event {
            RealtimeEvent::Connected => {
                debug!("realtime socket connected, waiting for join ack");
                continue;
            }
            RealtimeEvent::ChannelJoined { topic } if topic == channel => FeedEvent::Subscribed,
            RealtimeEvent::ChannelJoined { .. } => continue,
            RealtimeEvent::ChannelError { topic, message } if topic == channel => {
                FeedEvent::Unsubscribed { reason: message }
            }
            RealtimeEvent::ChannelError { .. } => continue,
            RealtimeEvent::PostgresChange { topic, change } if topic == channel => {
                FeedEvent::Change(change)
            }
            RealtimeEvent::PostgresChange { .. } => continue,
            RealtimeEvent::Disconnected => FeedEvent::Unsubscribed {
                reason: "socket disconnected".to_string(),
            },
            RealtimeEvent::Error(message) => {
                warn!(error = %message, "realtime error");
                FeedEvent::Unsubscribed { reason: message }
            }
        };
        if feed_tx.send(event).await.is_err() {
            break;
        }
    }
}
