//! A running presence session: the tracker plus its timers and feed consumer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::feed::{ChangeFeed, FeedEvent};
use crate::identity::Principal;
use crate::tracker::PresenceTracker;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owns every background task of one presence session.
///
/// Call [`PresenceSession::shutdown`] on teardown. Dropping the session
/// aborts its tasks but cannot delete the presence row.
pub struct PresenceSession {
    tracker: Arc<PresenceTracker>,
    feed: Arc<dyn ChangeFeed>,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceSession {
    /// Verify the table, join, load the roster, subscribe to the change feed
    /// and start the heartbeat, sweep and poll timers.
    pub async fn start(
        tracker: Arc<PresenceTracker>,
        principal: Principal,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let config = tracker.config().clone();

        if config.verify_table_on_start {
            tracker.verify().await;
        }
        tracker.join(&principal).await;
        tracker.refresh().await;

        let feed_rx = feed.subscribe().await;
        let mut tasks = vec![tokio::spawn(feed_consumer(Arc::clone(&tracker), feed_rx))];

        let t = Arc::clone(&tracker);
        tasks.push(spawn_timer(config.heartbeat_interval, move || {
            let t = Arc::clone(&t);
            async move { t.tick().await }
        }));

        let t = Arc::clone(&tracker);
        tasks.push(spawn_timer(config.sweep_interval, move || {
            let t = Arc::clone(&t);
            async move {
                t.sweep().await;
            }
        }));

        if let Some(poll) = config.poll_interval {
            let t = Arc::clone(&tracker);
            tasks.push(spawn_timer(poll, move || {
                let t = Arc::clone(&t);
                async move {
                    t.refresh().await;
                }
            }));
        }

        info!(
            user_id = %principal.id,
            heartbeat_secs = config.heartbeat_interval.as_secs(),
            sweep_secs = config.sweep_interval.as_secs(),
            "presence session started"
        );

        Self {
            tracker,
            feed,
            tasks,
        }
    }

    pub fn tracker(&self) -> &Arc<PresenceTracker> {
        &self.tracker
    }

    /// Manual roster reload. Returns the number of users online.
    pub async fn refresh(&self) -> usize {
        self.tracker.refresh().await
    }

    /// Stop every timer, release the feed subscription, then leave.
    pub async fn shutdown(mut self) {
        self.abort_tasks();
        self.feed.unsubscribe().await;
        self.tracker.set_connected(false).await;
        self.tracker.leave().await;
        info!("presence session stopped");
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PresenceSession {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            debug!("presence session dropped without shutdown");
            self.abort_tasks();
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Run `tick` every `period`, starting one period from now.
fn spawn_timer<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick().await;
        }
    })
}

/// Forward feed events into the tracker until the feed closes.
async fn feed_consumer(tracker: Arc<PresenceTracker>, mut rx: mpsc::Receiver<FeedEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Subscribed => tracker.set_connected(true).await,
            FeedEvent::Unsubscribed { reason } => {
                debug!(reason = %reason, "presence feed unsubscribed");
                tracker.set_connected(false).await;
            }
            FeedEvent::Change(change) => tracker.on_change(change).await,
        }
    }
    tracker.set_connected(false).await;
}
