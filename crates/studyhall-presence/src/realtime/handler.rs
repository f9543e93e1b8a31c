//! Incoming Phoenix message handler and `postgres_changes` decoding.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::ChannelMap;
use super::types::{PhoenixMessage, RealtimeEvent};
use crate::feed::ChangeEvent;
use crate::record::PresenceRecord;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Decode the `data` object of a `postgres_changes` payload.
///
/// Supabase sends `{ "type": "INSERT" | "UPDATE" | "DELETE", "record": {..},
/// "old_record": {..}, ... }`. Deletes only carry the primary key unless the
/// table uses `REPLICA IDENTITY FULL`.
pub(crate) fn parse_postgres_change(data: &serde_json::Value) -> Option<ChangeEvent> {
    let kind = data.get("type").and_then(|t| t.as_str())?;
    match kind {
        "INSERT" | "UPDATE" => {
            let record: PresenceRecord = serde_json::from_value(data.get("record")?.clone())
                .map_err(|e| debug!(error = %e, "undecodable presence row in change"))
                .ok()?;
            Some(if kind == "INSERT" {
                ChangeEvent::Insert(record)
            } else {
                ChangeEvent::Update(record)
            })
        }
        "DELETE" => {
            let id = data.get("old_record")?.get("id")?.as_str()?;
            Some(ChangeEvent::Delete { id: id.to_string() })
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    joined_channels: &ChannelMap,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let is_join_reply = match (msg.msg_ref.as_deref(), joined_channels.read().await.get(topic)) {
                (Some(msg_ref), Some(channel)) => channel.join_ref == msg_ref,
                _ => false,
            };
            if !is_join_reply {
                // Heartbeat and leave acknowledgments.
                return;
            }
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");
            if status == "ok" {
                debug!(topic = %topic, "Channel join acknowledged");
                let _ = event_tx
                    .send(RealtimeEvent::ChannelJoined {
                        topic: topic.to_string(),
                    })
                    .await;
            } else {
                let message = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                warn!(topic = %topic, status = %status, reason = %message, "Channel join rejected");
                let _ = event_tx
                    .send(RealtimeEvent::ChannelError {
                        topic: topic.to_string(),
                        message,
                    })
                    .await;
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel error".to_string(),
                })
                .await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel closed".to_string(),
                })
                .await;
        }
        "system" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str());
            let message = msg
                .payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string();
            if status == Some("error") {
                warn!(topic = %topic, message = %message, "Realtime system error");
                let _ = event_tx
                    .send(RealtimeEvent::ChannelError {
                        topic: topic.to_string(),
                        message,
                    })
                    .await;
            } else {
                debug!(topic = %topic, message = %message, "Realtime system message");
            }
        }
        "postgres_changes" => {
            let change = msg
                .payload
                .get("data")
                .and_then(parse_postgres_change);
            match change {
                Some(change) => {
                    debug!(topic = %topic, id = %change.id(), "Row change received");
                    let _ = event_tx
                        .send(RealtimeEvent::PostgresChange {
                            topic: topic.to_string(),
                            change,
                        })
                        .await;
                }
                None => debug!(topic = %topic, "Ignoring undecodable postgres_changes payload"),
            }
        }
        _ => {
            debug!(
                topic = %topic,
                event = %msg.event,
                "Unhandled Phoenix event"
            );
        }
    }
}
