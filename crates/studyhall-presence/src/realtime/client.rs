//! Public handle for interacting with the Supabase Realtime connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};

/// How long a graceful disconnect may take before the task is aborted.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Supabase Realtime connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task.
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    stopping: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let stopping = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_loop(
            config,
            Arc::clone(&stopping),
            event_tx,
            command_rx,
        ));

        let client = Self {
            command_tx,
            stopping,
            task: Mutex::new(Some(task)),
        };

        (client, event_rx)
    }

    /// Join a Supabase Realtime channel.
    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) {
        let _ = self
            .command_tx
            .send(RealtimeCommand::JoinChannel {
                topic: topic.to_string(),
                config,
            })
            .await;
    }

    /// Leave a channel.
    pub async fn leave_channel(&self, topic: &str) {
        let _ = self
            .command_tx
            .send(RealtimeCommand::LeaveChannel {
                topic: topic.to_string(),
            })
            .await;
    }

    /// Leave all channels, close the socket and stop reconnecting.
    pub async fn disconnect(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.command_tx.try_send(RealtimeCommand::Disconnect);

        let Some(mut task) = self.task.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            debug!("realtime connection did not close in time, aborting");
            task.abort();
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
