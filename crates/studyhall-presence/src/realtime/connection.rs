//! Realtime socket task: one WebSocket at a time, reconnecting with backoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

static NEXT_REF: AtomicU64 = AtomicU64::new(1);

/// A message ref unique within this process.
pub(crate) fn next_ref() -> String {
    NEXT_REF.fetch_add(1, Ordering::Relaxed).to_string()
}

/// A channel that should be (re)joined on reconnect.
#[derive(Clone)]
pub(crate) struct JoinedChannel {
    pub(crate) config: ChannelConfig,
    /// Ref of the most recent `phx_join`, matched against `phx_reply`.
    pub(crate) join_ref: String,
}

pub(crate) type ChannelMap = Arc<RwLock<HashMap<String, JoinedChannel>>>;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Doubling reconnect delay, capped at `max`.
struct Backoff {
    base: u64,
    max: u64,
    current: u64,
}

impl Backoff {
    fn new(base_secs: u64, max_secs: u64) -> Self {
        let base = base_secs.max(1);
        Self {
            base,
            max: max_secs.max(base),
            current: base,
        }
    }

    fn reset(&mut self) {
        self.current = self.base;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        Duration::from_secs(delay)
    }
}

enum SocketEnd {
    /// Dropped by the server or the network; reconnect.
    Lost,
    /// Closed on request; stay down.
    Stopped,
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Keep a socket open until `stopping` is set or a disconnect is requested.
pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    stopping: Arc<AtomicBool>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    mut command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let channels: ChannelMap = Arc::new(RwLock::new(HashMap::new()));
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let mut backoff = Backoff::new(config.reconnect_delay_secs, config.max_reconnect_delay_secs);
    let endpoint = config.ws_url();
    // The query string carries the api key.
    let shown = endpoint.split('?').next().unwrap_or_default().to_string();

    while !stopping.load(Ordering::SeqCst) {
        info!(url = %shown, "Opening realtime socket");
        let attempt =
            tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(endpoint.as_str()))
                .await;

        match attempt {
            Ok(Ok((ws, _))) => {
                backoff.reset();
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let end = run_socket(ws, &config, &channels, &event_tx, &mut command_rx).await;

                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
                if let SocketEnd::Stopped = end {
                    stopping.store(true, Ordering::SeqCst);
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Realtime connect failed");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("realtime connect failed: {e}")))
                    .await;
            }
            Err(_) => {
                warn!(timeout_secs = config.connect_timeout_secs, "Realtime connect timed out");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!(
                        "realtime connect timed out after {}s",
                        config.connect_timeout_secs
                    )))
                    .await;
            }
        }

        if stopping.load(Ordering::SeqCst) {
            break;
        }
        let delay = backoff.next_delay();
        info!(delay_secs = delay.as_secs(), "Realtime reconnect scheduled");
        tokio::time::sleep(delay).await;
    }

    debug!("realtime connection task finished");
}

/// Drive one open socket: inbound frames, heartbeats and client commands.
async fn run_socket(
    mut ws: Socket,
    config: &RealtimeConfig,
    channels: &ChannelMap,
    event_tx: &mpsc::Sender<RealtimeEvent>,
    command_rx: &mut mpsc::Receiver<RealtimeCommand>,
) -> SocketEnd {
    // Channels joined on an earlier socket get a fresh join ref.
    {
        let mut joined = channels.write().await;
        for (topic, channel) in joined.iter_mut() {
            let (join_ref, frame) = join_frame(topic, &channel.config);
            if !send_frame(&mut ws, &frame).await {
                return SocketEnd::Lost;
            }
            channel.join_ref = join_ref;
        }
    }

    let period = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<PhoenixMessage>(text.as_str()) {
                        Ok(msg) => handle_phoenix_message(&msg, channels, event_tx).await,
                        Err(_) => debug!(text = %text.as_str(), "Ignoring non-Phoenix frame"),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(frame = ?frame, "Realtime server closed the socket");
                    return SocketEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    return SocketEnd::Lost;
                }
                None => return SocketEnd::Lost,
            },
            _ = heartbeat.tick() => {
                if !send_frame(&mut ws, &control_frame("phoenix", "heartbeat")).await {
                    return SocketEnd::Lost;
                }
            }
            command = command_rx.recv() => match command {
                Some(RealtimeCommand::JoinChannel { topic, config }) => {
                    let (join_ref, frame) = join_frame(&topic, &config);
                    let sent = send_frame(&mut ws, &frame).await;
                    channels.write().await.insert(topic, JoinedChannel { config, join_ref });
                    if !sent {
                        return SocketEnd::Lost;
                    }
                }
                Some(RealtimeCommand::LeaveChannel { topic }) => {
                    channels.write().await.remove(&topic);
                    let frame = control_frame(&format!("realtime:{topic}"), "phx_leave");
                    if !send_frame(&mut ws, &frame).await {
                        return SocketEnd::Lost;
                    }
                }
                // A dropped client handle counts as a disconnect request.
                Some(RealtimeCommand::Disconnect) | None => {
                    let topics: Vec<String> =
                        channels.write().await.drain().map(|(topic, _)| topic).collect();
                    for topic in &topics {
                        send_frame(&mut ws, &control_frame(&format!("realtime:{topic}"), "phx_leave"))
                            .await;
                    }
                    let _ = ws.close(None).await;
                    return SocketEnd::Stopped;
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A `phx_join` for `topic`, with the ref it was sent under.
fn join_frame(topic: &str, config: &ChannelConfig) -> (String, PhoenixMessage) {
    let join_ref = next_ref();
    let frame = PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: "phx_join".to_string(),
        payload: config.to_join_payload(),
        msg_ref: Some(join_ref.clone()),
    };
    (join_ref, frame)
}

/// A frame with an empty payload (heartbeat, leave).
fn control_frame(topic: &str, event: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: event.to_string(),
        payload: serde_json::json!({}),
        msg_ref: Some(next_ref()),
    }
}

async fn send_frame(ws: &mut Socket, frame: &PhoenixMessage) -> bool {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, event = %frame.event, "Failed to encode Phoenix frame");
            return false;
        }
    };
    match ws.send(WsMessage::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, event = %frame.event, "Failed to send Phoenix frame");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::types::PostgresChangesFilter;

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new(1, 5);
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_never_spins_at_zero() {
        let mut backoff = Backoff::new(0, 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn join_frame_uses_its_ref_and_realtime_topic() {
        let config = ChannelConfig {
            postgres_changes: vec![PostgresChangesFilter::all_on("online_users")],
            access_token: None,
        };
        let (join_ref, frame) = join_frame("online_users_channel", &config);
        assert_eq!(frame.topic, "realtime:online_users_channel");
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.msg_ref.as_deref(), Some(join_ref.as_str()));
        assert_ne!(next_ref(), join_ref);
    }
}
