//! Presence tracker behaviour against the in-memory store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use studyhall_presence::{
    ChangeEvent, ManualClock, MemoryStore, PresenceEvent, PresenceHealth, PresenceRecord,
    PresenceStore, PresenceTracker, Principal, SessionState, StoreError, TrackerConfig,
};

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}

fn rec(id: &str, last_seen: DateTime<Utc>) -> PresenceRecord {
    PresenceRecord {
        id: id.into(),
        email: format!("{id}@example.edu"),
        full_name: String::new(),
        last_seen,
    }
}

fn principal(id: &str) -> Principal {
    Principal::new(id, format!("{id}@example.edu"), None)
}

fn tracker(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> PresenceTracker {
    PresenceTracker::new(store.clone(), clock.clone(), TrackerConfig::default())
}

fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>) {
    (MemoryStore::new(), Arc::new(ManualClock::new(t0())))
}

#[tokio::test]
async fn sweep_removes_exactly_the_rows_past_the_window() {
    let (store, clock) = setup();
    for (id, age) in [("now", 0), ("ten", 10), ("thirty_one", 31), ("forty", 40)] {
        store.seed(rec(id, t0() - secs(age))).await;
    }

    let removed = tracker(&store, &clock).sweep().await;

    assert_eq!(removed, 2);
    assert!(store.get("now").await.is_some());
    assert!(store.get("ten").await.is_some());
    assert!(store.get("thirty_one").await.is_none());
    assert!(store.get("forty").await.is_none());
}

#[tokio::test]
async fn row_exactly_at_the_window_survives_sweep_and_counts_as_online() {
    let (store, clock) = setup();
    store.seed(rec("edge", t0() - secs(30))).await;
    let tracker = tracker(&store, &clock);

    assert_eq!(tracker.sweep().await, 0);
    let snapshot = tracker.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "edge");
}

#[tokio::test]
async fn silent_joiner_is_swept_after_the_window() {
    let (store, clock) = setup();
    let a = tracker(&store, &clock);
    assert!(a.join(&principal("a")).await);

    clock.set(t0() + secs(31));
    let sweeper = tracker(&store, &clock);
    assert_eq!(sweeper.sweep().await, 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn heartbeating_user_survives_sweep() {
    let (store, clock) = setup();
    let b = tracker(&store, &clock);
    assert!(b.join(&principal("b")).await);

    for at in [10, 20] {
        clock.set(t0() + secs(at));
        assert!(b.heartbeat().await);
    }
    clock.set(t0() + secs(25));
    assert_eq!(b.sweep().await, 0);
    assert_eq!(store.get("b").await.unwrap().last_seen, t0() + secs(20));
}

#[tokio::test]
async fn stale_update_event_removes_user_locally() {
    let (store, clock) = setup();
    let (tracker, mut events) =
        PresenceTracker::with_events(store.clone(), clock.clone(), TrackerConfig::default());

    tracker.on_change(ChangeEvent::Insert(rec("c", t0()))).await;
    assert_eq!(tracker.online_users().await.len(), 1);

    clock.set(t0() + secs(35));
    tracker.on_change(ChangeEvent::Update(rec("c", t0()))).await;
    assert!(tracker.online_users().await.is_empty());

    assert!(matches!(events.try_recv(), Ok(PresenceEvent::UserOnline(_))));
    assert!(matches!(
        events.try_recv(),
        Ok(PresenceEvent::UserOffline { ref id, .. }) if id == "c"
    ));
}

#[tokio::test]
async fn double_join_upserts_once() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    let me = principal("me");

    assert!(tracker.join(&me).await);
    assert!(!tracker.join(&me).await);
    assert_eq!(store.stats().upserts.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.state().await, SessionState::Active);
}

#[tokio::test]
async fn never_more_than_one_row_per_session() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    let me = principal("me");

    for round in 0..3 {
        tracker.join(&me).await;
        assert!(store.len().await <= 1);
        clock.advance(secs(10));
        tracker.heartbeat().await;
        tracker.join(&me).await;
        assert_eq!(store.len().await, 1, "round {round}");
        tracker.leave().await;
        assert!(store.is_empty().await);
    }
}

#[tokio::test]
async fn heartbeat_is_a_noop_before_join() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    assert!(!tracker.heartbeat().await);
    assert_eq!(store.stats().total(), 0);
}

#[tokio::test]
async fn snapshot_never_returns_stale_rows() {
    let (store, clock) = setup();
    for (i, age) in [0, 5, 29, 30, 31, 90].into_iter().enumerate() {
        store.seed(rec(&format!("u{i}"), t0() - secs(age))).await;
    }
    let tracker = tracker(&store, &clock);

    let snapshot = tracker.snapshot().await;
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.iter().all(|r| t0() - r.last_seen <= secs(30)));
    assert!(snapshot
        .windows(2)
        .all(|pair| pair[0].last_seen >= pair[1].last_seen));
}

#[tokio::test]
async fn swept_own_row_is_rejoined_on_next_tick() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    assert!(tracker.join(&principal("me")).await);

    store.delete("me").await.unwrap();
    assert!(!tracker.heartbeat().await);
    assert_eq!(tracker.state().await, SessionState::Idle);

    tracker.tick().await;
    assert_eq!(tracker.state().await, SessionState::Active);
    assert!(store.get("me").await.is_some());
    assert_eq!(store.stats().upserts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn access_denied_join_stays_idle_and_recovers() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    store.fail_next(StoreError::AccessDenied("new row violates row-level security".into()));

    assert!(!tracker.join(&principal("me")).await);
    assert_eq!(tracker.state().await, SessionState::Idle);
    assert!(store.is_empty().await);
    match tracker.health().await {
        PresenceHealth::Unavailable(reason) => assert!(reason.starts_with("presence unavailable")),
        other => panic!("expected unavailable, got {other:?}"),
    }

    tracker.tick().await;
    assert_eq!(tracker.state().await, SessionState::Active);
    assert_eq!(tracker.health().await, PresenceHealth::Ok);
}

#[tokio::test]
async fn missing_table_is_reported_once_and_stops_traffic() {
    let (store, clock) = setup();
    let (tracker, mut events) =
        PresenceTracker::with_events(store.clone(), clock.clone(), TrackerConfig::default());
    store.fail_always(Some(StoreError::SchemaMissing(
        "relation \"public.online_users\" does not exist".into(),
    )));

    assert!(!tracker.verify().await);
    assert!(matches!(tracker.health().await, PresenceHealth::Misconfigured(_)));
    let calls = store.stats().total();

    store.fail_always(None);
    tracker.join(&principal("me")).await;
    tracker.heartbeat().await;
    tracker.tick().await;
    tracker.sweep().await;
    tracker.refresh().await;
    assert!(tracker.snapshot().await.is_empty());
    assert_eq!(store.stats().total(), calls);

    let mut unavailable = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PresenceEvent::Unavailable(_)) {
            unavailable += 1;
        }
    }
    assert_eq!(unavailable, 1);
}

#[tokio::test]
async fn transient_failures_are_absorbed() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    store.seed(rec("other", t0())).await;
    tracker.refresh().await;

    store.fail_always(Some(StoreError::Transient("connection reset".into())));
    assert_eq!(tracker.sweep().await, 0);
    assert!(tracker.snapshot().await.is_empty());
    // A failed reload keeps the previous roster.
    assert_eq!(tracker.refresh().await, 1);
    assert!(matches!(tracker.health().await, PresenceHealth::Unavailable(_)));
}

#[tokio::test]
async fn leave_removes_own_row_and_resets_guard() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    let me = principal("me");

    tracker.join(&me).await;
    assert!(tracker.leave().await);
    assert!(store.is_empty().await);
    assert_eq!(tracker.state().await, SessionState::Idle);
    assert!(tracker.online_users().await.is_empty());

    assert!(tracker.join(&me).await);
}

#[tokio::test]
async fn failed_leave_is_reclaimed_by_sweep() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    tracker.join(&principal("me")).await;

    store.fail_next(StoreError::Transient("offline".into()));
    assert!(!tracker.leave().await);
    assert_eq!(store.len().await, 1);

    clock.advance(secs(31));
    assert_eq!(tracker.sweep().await, 1);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn refresh_keeps_newer_local_heartbeat() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);

    tracker
        .on_change(ChangeEvent::Update(rec("peer", t0() + secs(5))))
        .await;
    store.seed(rec("peer", t0())).await;
    clock.set(t0() + secs(6));

    assert_eq!(tracker.refresh().await, 1);
    assert_eq!(tracker.online_users().await[0].last_seen, t0() + secs(5));
}

#[tokio::test]
async fn own_entry_returns_after_an_outage_longer_than_the_window() {
    let (store, clock) = setup();
    let tracker = tracker(&store, &clock);
    assert!(tracker.join(&principal("me")).await);

    store.fail_always(Some(StoreError::Transient("connection reset".into())));
    for at in [10, 20, 30, 40] {
        clock.set(t0() + secs(at));
        tracker.tick().await;
    }
    assert!(tracker.online_users().await.is_empty());

    store.fail_always(None);
    clock.set(t0() + secs(50));
    tracker.tick().await;

    assert_eq!(tracker.state().await, SessionState::Active);
    let online = tracker.online_users().await;
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].id, "me");
    assert_eq!(online[0].last_seen, t0() + secs(50));
}

#[tokio::test]
async fn sweep_with_an_unbounded_window_removes_nothing() {
    let (store, clock) = setup();
    store.seed(rec("ancient", t0() - secs(86_400 * 365))).await;
    let config = TrackerConfig {
        stale_window: std::time::Duration::from_secs(u64::MAX / 4),
        ..TrackerConfig::default()
    };
    let tracker = PresenceTracker::new(store.clone(), clock.clone(), config);

    assert_eq!(tracker.sweep().await, 0);
    assert!(store.get("ancient").await.is_some());
    assert_eq!(tracker.health().await, PresenceHealth::Ok);
}

#[tokio::test]
async fn refresh_keeps_a_pushed_row_the_read_could_not_see() {
    let (store, clock) = setup();
    let (tracker, mut events) =
        PresenceTracker::with_events(store.clone(), clock.clone(), TrackerConfig::default());

    // Pushed before the row is visible to a snapshot read.
    tracker.on_change(ChangeEvent::Insert(rec("peer", t0()))).await;
    assert_eq!(tracker.refresh().await, 1);
    assert_eq!(tracker.online_users().await[0].id, "peer");

    let offline = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, PresenceEvent::UserOffline { .. }))
        .count();
    assert_eq!(offline, 0);

    // Once the snapshot postdates it, an absent entry is dropped.
    clock.advance(secs(1));
    assert_eq!(tracker.refresh().await, 0);
}
