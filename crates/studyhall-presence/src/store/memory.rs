//! In-process presence store.
//!
//! Used when no backend is configured and by tests. Every write publishes a
//! `ChangeEvent` to feeds created with [`MemoryStore::feed`], mirroring the
//! hosted change feed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use super::{PresenceStore, StoreError};
use crate::feed::{ChangeEvent, MemoryFeed};
use crate::record::PresenceRecord;

/// Call counters, one per store operation.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub upserts: AtomicUsize,
    pub touches: AtomicUsize,
    pub deletes: AtomicUsize,
    pub sweeps: AtomicUsize,
    pub selects: AtomicUsize,
    pub probes: AtomicUsize,
}

impl StoreStats {
    pub fn total(&self) -> usize {
        [
            &self.upserts,
            &self.touches,
            &self.deletes,
            &self.sweeps,
            &self.selects,
            &self.probes,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

pub struct MemoryStore {
    rows: RwLock<HashMap<String, PresenceRecord>>,
    changes: broadcast::Sender<ChangeEvent>,
    failures: Mutex<VecDeque<StoreError>>,
    sticky_failure: Mutex<Option<StoreError>>,
    stats: StoreStats,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(256);
        Arc::new(Self {
            rows: RwLock::new(HashMap::new()),
            changes,
            failures: Mutex::new(VecDeque::new()),
            sticky_failure: Mutex::new(None),
            stats: StoreStats::default(),
        })
    }

    /// A change feed over this store's writes.
    pub fn feed(self: &Arc<Self>) -> MemoryFeed {
        MemoryFeed::new(self.changes.clone())
    }

    /// Fail the next store call with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: StoreError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(err);
    }

    /// Fail every store call with `err` until cleared with `None`.
    pub fn fail_always(&self, err: Option<StoreError>) {
        *self.sticky_failure.lock().unwrap_or_else(|e| e.into_inner()) = err;
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Insert a row directly, bypassing counters and failure injection.
    pub async fn seed(&self, record: PresenceRecord) {
        let previous = self
            .rows
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        self.publish(if previous.is_some() {
            ChangeEvent::Update(record)
        } else {
            ChangeEvent::Insert(record)
        });
    }

    pub async fn get(&self, id: &str) -> Option<PresenceRecord> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check(&self, counter: &AtomicUsize) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(err);
        }
        match &*self.sticky_failure.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        self.check(&self.stats.upserts)?;
        let previous = self
            .rows
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        self.publish(if previous.is_some() {
            ChangeEvent::Update(record.clone())
        } else {
            ChangeEvent::Insert(record.clone())
        });
        Ok(())
    }

    async fn touch(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check(&self.stats.touches)?;
        let updated = {
            let mut rows = self.rows.write().await;
            rows.get_mut(id).map(|row| {
                row.last_seen = last_seen;
                row.clone()
            })
        };
        match updated {
            Some(row) => {
                self.publish(ChangeEvent::Update(row));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check(&self.stats.deletes)?;
        if self.rows.write().await.remove(id).is_some() {
            self.publish(ChangeEvent::Delete { id: id.to_string() });
        }
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.check(&self.stats.sweeps)?;
        let removed: Vec<String> = {
            let mut rows = self.rows.write().await;
            let stale: Vec<String> = rows
                .values()
                .filter(|r| r.last_seen < cutoff)
                .map(|r| r.id.clone())
                .collect();
            for id in &stale {
                rows.remove(id);
            }
            stale
        };
        for id in &removed {
            self.publish(ChangeEvent::Delete { id: id.clone() });
        }
        Ok(removed.len())
    }

    async fn select_all(&self) -> Result<Vec<PresenceRecord>, StoreError> {
        self.check(&self.stats.selects)?;
        let mut rows: Vec<PresenceRecord> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn probe(&self, _columns: &str) -> Result<(), StoreError> {
        self.check(&self.stats.probes)?;
        Ok(())
    }
}
