//! Local "who's online" roster.
//!
//! Push events and snapshot reloads both land here. Every merge keeps the
//! entry with the newest `last_seen`, so the result does not depend on the
//! order in which the two producers deliver.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::feed::ChangeEvent;
use crate::record::PresenceRecord;

/// Visible effect of applying a change to the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    Joined(PresenceRecord),
    Refreshed(PresenceRecord),
    Left { id: String, display_name: String },
}

#[derive(Debug, Default, Clone)]
pub struct Roster {
    entries: HashMap<String, PresenceRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one push event. Returns `None` when nothing visible changed.
    pub fn apply(
        &mut self,
        event: &ChangeEvent,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Option<RosterChange> {
        match event {
            ChangeEvent::Insert(record) | ChangeEvent::Update(record) => {
                if record.is_active(now, window) {
                    self.upsert_newer(record)
                } else {
                    match self.entries.get(&record.id) {
                        // An older, stale copy must not evict a fresh entry.
                        Some(existing)
                            if existing.last_seen > record.last_seen
                                && existing.is_active(now, window) =>
                        {
                            None
                        }
                        Some(_) => self.remove(&record.id),
                        None => None,
                    }
                }
            }
            ChangeEvent::Delete { id } => self.remove(id),
        }
    }

    /// Replace the roster with the active part of a store snapshot read at
    /// `taken_at`. Local entries with a newer `last_seen` than the snapshot's
    /// copy are kept, as are absent entries written at or after `taken_at`.
    pub fn merge_snapshot(
        &mut self,
        snapshot: Vec<PresenceRecord>,
        taken_at: DateTime<Utc>,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Vec<RosterChange> {
        let mut next: HashMap<String, PresenceRecord> = HashMap::new();
        for record in snapshot.into_iter().filter(|r| r.is_active(now, window)) {
            let record = match self.entries.get(&record.id) {
                Some(local) if local.last_seen > record.last_seen => local.clone(),
                _ => record,
            };
            match next.get(&record.id) {
                Some(seen) if seen.last_seen >= record.last_seen => {}
                _ => {
                    next.insert(record.id.clone(), record);
                }
            }
        }

        // The snapshot cannot have seen these yet.
        for (id, local) in &self.entries {
            let unseen = local.last_seen >= taken_at && local.is_active(now, window);
            if unseen && !next.contains_key(id) {
                next.insert(id.clone(), local.clone());
            }
        }

        let mut changes = Vec::new();
        for (id, old) in &self.entries {
            if !next.contains_key(id) {
                changes.push(RosterChange::Left {
                    id: id.clone(),
                    display_name: old.display_name().to_string(),
                });
            }
        }
        for (id, record) in &next {
            if !self.entries.contains_key(id) {
                changes.push(RosterChange::Joined(record.clone()));
            }
        }

        self.entries = next;
        changes
    }

    /// Drop every entry older than the window.
    pub fn prune(&mut self, now: DateTime<Utc>, window: chrono::Duration) -> Vec<RosterChange> {
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|r| !r.is_active(now, window))
            .map(|r| r.id.clone())
            .collect();
        stale.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Active entries, newest `last_seen` first.
    pub fn active(&self, now: DateTime<Utc>, window: chrono::Duration) -> Vec<PresenceRecord> {
        let mut users: Vec<PresenceRecord> = self
            .entries
            .values()
            .filter(|r| r.is_active(now, window))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        users
    }

    pub fn get(&self, id: &str) -> Option<&PresenceRecord> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert_newer(&mut self, record: &PresenceRecord) -> Option<RosterChange> {
        match self.entries.get(&record.id) {
            Some(existing) if existing.last_seen > record.last_seen => None,
            Some(existing) if existing == record => None,
            Some(_) => {
                self.entries.insert(record.id.clone(), record.clone());
                Some(RosterChange::Refreshed(record.clone()))
            }
            None => {
                self.entries.insert(record.id.clone(), record.clone());
                Some(RosterChange::Joined(record.clone()))
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<RosterChange> {
        self.entries.remove(id).map(|old| RosterChange::Left {
            id: old.id.clone(),
            display_name: old.display_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn window() -> chrono::Duration {
        chrono::Duration::seconds(30)
    }

    fn rec(id: &str, last_seen: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            id: id.into(),
            email: format!("{id}@example.edu"),
            full_name: id.to_uppercase(),
            last_seen,
        }
    }

    #[test]
    fn insert_adds_once() {
        let mut roster = Roster::new();
        let ev = ChangeEvent::Insert(rec("a", t(0)));
        assert!(matches!(roster.apply(&ev, t(1), window()), Some(RosterChange::Joined(_))));
        assert_eq!(roster.apply(&ev, t(1), window()), None);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn stale_insert_is_ignored() {
        let mut roster = Roster::new();
        let ev = ChangeEvent::Insert(rec("a", t(0)));
        assert_eq!(roster.apply(&ev, t(31), window()), None);
        assert!(roster.is_empty());
    }

    #[test]
    fn stale_update_removes_entry() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Insert(rec("a", t(0))), t(0), window());
        let change = roster.apply(&ChangeEvent::Update(rec("a", t(0))), t(35), window());
        assert!(matches!(change, Some(RosterChange::Left { ref id, .. }) if id == "a"));
        assert!(!roster.contains("a"));
    }

    #[test]
    fn older_update_does_not_overwrite_newer() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Update(rec("a", t(20))), t(20), window());
        assert_eq!(
            roster.apply(&ChangeEvent::Update(rec("a", t(10))), t(21), window()),
            None
        );
        assert_eq!(roster.get("a").unwrap().last_seen, t(20));
    }

    #[test]
    fn delayed_stale_update_keeps_fresh_entry() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Update(rec("a", t(40))), t(40), window());
        assert_eq!(
            roster.apply(&ChangeEvent::Update(rec("a", t(0))), t(41), window()),
            None
        );
        assert!(roster.contains("a"));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Insert(rec("a", t(0))), t(0), window());
        let del = ChangeEvent::Delete { id: "a".into() };
        assert!(roster.apply(&del, t(1), window()).is_some());
        assert_eq!(roster.apply(&del, t(1), window()), None);
    }

    #[test]
    fn event_order_does_not_matter_for_updates() {
        let events = [
            ChangeEvent::Insert(rec("a", t(0))),
            ChangeEvent::Update(rec("a", t(10))),
            ChangeEvent::Update(rec("a", t(20))),
        ];
        let mut forward = Roster::new();
        let mut backward = Roster::new();
        for ev in &events {
            forward.apply(ev, t(25), window());
        }
        for ev in events.iter().rev() {
            backward.apply(ev, t(25), window());
        }
        assert_eq!(forward.active(t(25), window()), backward.active(t(25), window()));
        assert_eq!(forward.get("a").unwrap().last_seen, t(20));
    }

    #[test]
    fn snapshot_merge_reports_diff_and_keeps_newer_local() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Insert(rec("a", t(20))), t(20), window());
        roster.apply(&ChangeEvent::Insert(rec("gone", t(15))), t(20), window());

        let changes = roster.merge_snapshot(
            vec![rec("a", t(10)), rec("b", t(18)), rec("old", t(-40))],
            t(20),
            t(21),
            window(),
        );

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get("a").unwrap().last_seen, t(20));
        assert!(changes.contains(&RosterChange::Joined(rec("b", t(18)))));
        assert!(changes
            .iter()
            .any(|c| matches!(c, RosterChange::Left { id, .. } if id == "gone")));
        assert!(!roster.contains("old"));
    }

    #[test]
    fn insert_during_snapshot_read_survives_either_order() {
        let push = ChangeEvent::Insert(rec("b", t(20)));
        let taken_at = t(19);

        let mut push_first = Roster::new();
        push_first.apply(&push, t(20), window());
        let changes = push_first.merge_snapshot(Vec::new(), taken_at, t(21), window());
        assert!(changes.is_empty());

        let mut snapshot_first = Roster::new();
        snapshot_first.merge_snapshot(Vec::new(), taken_at, t(21), window());
        snapshot_first.apply(&push, t(21), window());

        assert!(push_first.contains("b"));
        assert_eq!(
            push_first.active(t(21), window()),
            snapshot_first.active(t(21), window())
        );
    }

    #[test]
    fn entry_older_than_the_snapshot_is_dropped_when_absent() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Insert(rec("a", t(10))), t(10), window());
        let changes = roster.merge_snapshot(Vec::new(), t(15), t(16), window());
        assert!(matches!(changes.as_slice(), [RosterChange::Left { id, .. }] if id == "a"));
        assert!(roster.is_empty());
    }

    #[test]
    fn active_is_filtered_and_sorted_newest_first() {
        let mut roster = Roster::new();
        for (id, at) in [("a", 0), ("b", 20), ("c", 10)] {
            roster.apply(&ChangeEvent::Insert(rec(id, t(at))), t(at), window());
        }
        let ids: Vec<String> = roster
            .active(t(31), window())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn prune_drops_stale_entries() {
        let mut roster = Roster::new();
        roster.apply(&ChangeEvent::Insert(rec("a", t(0))), t(0), window());
        roster.apply(&ChangeEvent::Insert(rec("b", t(25))), t(25), window());
        let left = roster.prune(t(45), window());
        assert_eq!(left.len(), 1);
        assert!(roster.contains("b"));
    }
}
