//! The presence tracker: one session's row in the shared roster.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::feed::ChangeEvent;
use crate::identity::Principal;
use crate::record::{stale_cutoff, PresenceRecord};
use crate::roster::{Roster, RosterChange};
use crate::store::{PresenceStore, StoreError, PRESENCE_COLUMNS};

use super::types::{PresenceEvent, PresenceHealth, SessionState, TrackerConfig};

/// Keeps one principal's presence row fresh and mirrors everyone else's.
///
/// Every operation absorbs store failures: they are logged and reflected in
/// [`PresenceTracker::health`], never returned to the caller.
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    principal: RwLock<Option<Principal>>,
    state: Mutex<SessionState>,
    roster: RwLock<Roster>,
    connected: RwLock<bool>,
    health: RwLock<PresenceHealth>,
    events: Option<mpsc::Sender<PresenceEvent>>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            principal: RwLock::new(None),
            state: Mutex::new(SessionState::Idle),
            roster: RwLock::new(Roster::new()),
            connected: RwLock::new(false),
            health: RwLock::new(PresenceHealth::Ok),
            events: None,
        }
    }

    /// Create a tracker that also reports roster changes on a channel.
    pub fn with_events(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> (Self, mpsc::Receiver<PresenceEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let mut tracker = Self::new(store, clock, config);
        tracker.events = Some(tx);
        (tracker, rx)
    }

    // -----------------------------------------------------------------------
    // Own row
    // -----------------------------------------------------------------------

    /// Upsert this principal's row. At most one successful join per session:
    /// returns `false` without touching the store unless the session is `Idle`.
    pub async fn join(&self, principal: &Principal) -> bool {
        if self.is_misconfigured().await {
            return false;
        }
        {
            let mut state = self.state.lock().await;
            if *state != SessionState::Idle {
                debug!(state = ?*state, "join skipped");
                return false;
            }
            *state = SessionState::Joining;
        }
        *self.principal.write().await = Some(principal.clone());

        let record = PresenceRecord::for_principal(principal, self.clock.now());
        let result = self.store.upsert(&record).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(()) if *state == SessionState::Joining => {
                *state = SessionState::Active;
                drop(state);
                info!(user_id = %record.id, "joined online roster");
                self.mark_healthy().await;
                self.apply_local(ChangeEvent::Insert(record)).await;
                true
            }
            Ok(()) => {
                // leave() ran while the upsert was in flight.
                drop(state);
                warn!(user_id = %record.id, "join completed after leave, removing row");
                if let Err(e) = self.store.delete(&record.id).await {
                    self.record_failure("join", &e).await;
                }
                false
            }
            Err(e) => {
                if *state == SessionState::Joining {
                    *state = SessionState::Idle;
                }
                drop(state);
                self.record_failure("join", &e).await;
                false
            }
        }
    }

    /// Refresh `last_seen` on the own row. No-op unless `Active`.
    pub async fn heartbeat(&self) -> bool {
        if self.is_misconfigured().await || self.state().await != SessionState::Active {
            return false;
        }
        let Some(principal) = self.principal.read().await.clone() else {
            return false;
        };
        let id = principal.id.clone();

        let now = self.clock.now();
        match self.store.touch(&id, now).await {
            Ok(true) => {
                self.mark_healthy().await;
                // The own entry may have been pruned during an outage.
                let own = match self.roster.read().await.get(&id) {
                    Some(own) => PresenceRecord {
                        last_seen: now,
                        ..own.clone()
                    },
                    None => PresenceRecord::for_principal(&principal, now),
                };
                self.apply_local(ChangeEvent::Update(own)).await;
                true
            }
            Ok(false) => {
                // Swept while we were away; rejoin on the next tick.
                let mut state = self.state.lock().await;
                if *state == SessionState::Active {
                    *state = SessionState::Idle;
                }
                warn!(user_id = %id, "own presence row is gone, will rejoin");
                false
            }
            Err(e) => {
                self.record_failure("heartbeat", &e).await;
                false
            }
        }
    }

    /// One heartbeat-timer tick: heartbeat when joined, retry the join when
    /// not, then drop stale roster entries.
    pub async fn tick(&self) {
        match self.state().await {
            SessionState::Active => {
                self.heartbeat().await;
            }
            SessionState::Idle => {
                let principal = self.principal.read().await.clone();
                if let Some(principal) = principal {
                    self.join(&principal).await;
                }
            }
            SessionState::Joining | SessionState::Leaving => {}
        }
        self.prune().await;
    }

    /// Delete this principal's row and reset the join guard. Best effort:
    /// a failed delete is reclaimed by a later sweep.
    pub async fn leave(&self) -> bool {
        let Some(id) = self.principal_id().await else {
            *self.state.lock().await = SessionState::Idle;
            return false;
        };
        *self.state.lock().await = SessionState::Leaving;

        let result = if self.is_misconfigured().await {
            Ok(())
        } else {
            self.store.delete(&id).await
        };

        *self.state.lock().await = SessionState::Idle;
        *self.principal.write().await = None;
        if let Some(change) = self.roster.write().await.remove(&id) {
            self.emit_change(change);
        }

        match result {
            Ok(()) => {
                info!(user_id = %id, "left online roster");
                true
            }
            Err(e) => {
                warn!(user_id = %id, error = %e, "leave failed, row will expire via sweep");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared roster
    // -----------------------------------------------------------------------

    /// Delete every row older than the stale window, whoever owns it.
    /// Returns the number of rows removed.
    pub async fn sweep(&self) -> usize {
        if self.is_misconfigured().await {
            return 0;
        }
        let cutoff = stale_cutoff(self.clock.now(), self.config.window());
        match self.store.delete_older_than(cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "swept stale presence rows");
                } else {
                    debug!("sweep found no stale rows");
                }
                self.mark_healthy().await;
                self.prune().await;
                removed
            }
            Err(e) => {
                self.record_failure("sweep", &e).await;
                0
            }
        }
    }

    /// Active rows from the store, newest first. Empty when the read fails.
    pub async fn snapshot(&self) -> Vec<PresenceRecord> {
        self.fetch_active().await.unwrap_or_default()
    }

    /// Reload the roster from a store snapshot. On failure the roster is
    /// left as it was. Returns the number of users online afterwards.
    pub async fn refresh(&self) -> usize {
        let taken_at = self.clock.now();
        let Some(snapshot) = self.fetch_active().await else {
            return self.online_users().await.len();
        };
        let total = snapshot.len();
        let changes = self
            .roster
            .write()
            .await
            .merge_snapshot(snapshot, taken_at, self.clock.now(), self.config.window());
        for change in changes {
            self.emit_change(change);
        }
        let online_count = self.online_users().await.len();
        debug!(online_count, total, "roster reloaded");
        self.emit(PresenceEvent::RosterRefreshed { online_count });
        online_count
    }

    /// Apply one push event from the change feed.
    pub async fn on_change(&self, event: ChangeEvent) {
        debug!(id = %event.id(), "presence change");
        self.apply_local(event).await;
    }

    /// Probe the table shape. A missing table latches `Misconfigured`.
    pub async fn verify(&self) -> bool {
        match self.store.probe(PRESENCE_COLUMNS).await {
            Ok(()) => {
                self.mark_healthy().await;
                true
            }
            Err(e) => {
                self.record_failure("verify", &e).await;
                false
            }
        }
    }

    /// Locally known online users, newest first.
    pub async fn online_users(&self) -> Vec<PresenceRecord> {
        self.roster
            .read()
            .await
            .active(self.clock.now(), self.config.window())
    }

    // -----------------------------------------------------------------------
    // Connection and health
    // -----------------------------------------------------------------------

    /// Record the change feed's subscription status.
    pub async fn set_connected(&self, connected: bool) {
        let changed = {
            let mut flag = self.connected.write().await;
            let changed = *flag != connected;
            *flag = connected;
            changed
        };
        if changed {
            info!(connected, "presence feed status changed");
            self.emit(if connected {
                PresenceEvent::Connected
            } else {
                PresenceEvent::Disconnected
            });
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    pub async fn health(&self) -> PresenceHealth {
        self.health.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn principal_id(&self) -> Option<String> {
        self.principal.read().await.as_ref().map(|p| p.id.clone())
    }

    async fn fetch_active(&self) -> Option<Vec<PresenceRecord>> {
        if self.is_misconfigured().await {
            return None;
        }
        match self.store.select_all().await {
            Ok(rows) => {
                self.mark_healthy().await;
                let now = self.clock.now();
                let window = self.config.window();
                let mut active: Vec<PresenceRecord> =
                    rows.into_iter().filter(|r| r.is_active(now, window)).collect();
                active.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
                Some(active)
            }
            Err(e) => {
                self.record_failure("snapshot", &e).await;
                None
            }
        }
    }

    async fn apply_local(&self, event: ChangeEvent) {
        let change = self
            .roster
            .write()
            .await
            .apply(&event, self.clock.now(), self.config.window());
        if let Some(change) = change {
            self.emit_change(change);
        }
    }

    async fn prune(&self) {
        let left = self
            .roster
            .write()
            .await
            .prune(self.clock.now(), self.config.window());
        for change in left {
            self.emit_change(change);
        }
    }

    async fn is_misconfigured(&self) -> bool {
        matches!(*self.health.read().await, PresenceHealth::Misconfigured(_))
    }

    async fn mark_healthy(&self) {
        let mut health = self.health.write().await;
        if matches!(*health, PresenceHealth::Unavailable(_)) {
            info!("presence available again");
            *health = PresenceHealth::Ok;
        }
    }

    async fn record_failure(&self, op: &'static str, err: &StoreError) {
        let next = match err {
            _ if err.is_configuration_problem() => {
                error!(op, error = %err, "presence table is not set up; presence disabled");
                PresenceHealth::Misconfigured(err.to_string())
            }
            StoreError::AccessDenied(_) => {
                warn!(op, error = %err, "presence write denied by access policy");
                PresenceHealth::Unavailable(format!("presence unavailable: {err}"))
            }
            _ => {
                warn!(op, error = %err, "presence operation failed");
                PresenceHealth::Unavailable(format!("presence unavailable: {err}"))
            }
        };

        let mut health = self.health.write().await;
        if matches!(*health, PresenceHealth::Misconfigured(_)) || *health == next {
            return;
        }
        let reason = match &next {
            PresenceHealth::Unavailable(r) | PresenceHealth::Misconfigured(r) => r.clone(),
            PresenceHealth::Ok => String::new(),
        };
        *health = next;
        drop(health);
        self.emit(PresenceEvent::Unavailable(reason));
    }

    fn emit_change(&self, change: RosterChange) {
        match change {
            RosterChange::Joined(record) => self.emit(PresenceEvent::UserOnline(record)),
            RosterChange::Left { id, display_name } => {
                self.emit(PresenceEvent::UserOffline { id, display_name })
            }
            RosterChange::Refreshed(_) => {}
        }
    }

    fn emit(&self, event: PresenceEvent) {
        if let Some(tx) = &self.events {
            // Never block the tracker on a slow consumer.
            if tx.try_send(event).is_err() {
                debug!("presence event dropped");
            }
        }
    }
}
