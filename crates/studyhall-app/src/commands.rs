//! Subcommand handlers.

use std::sync::Arc;

use studyhall_common::StudyhallError;
use studyhall_config::StudyhallConfig;
use studyhall_presence::{
    check_table, Clock, PresenceEvent, PresenceHealth, PresenceRecord, PresenceSession, PresenceTracker,
    Principal, SystemClock,
};
use tracing::info;

use crate::backend::{tracker_config, Backend};

fn oneshot_tracker(backend: &Backend, config: &StudyhallConfig) -> PresenceTracker {
    PresenceTracker::new(
        Arc::clone(&backend.store),
        Arc::new(SystemClock),
        tracker_config(&config.presence),
    )
}

fn format_user(record: &PresenceRecord) -> String {
    let age = record.age(SystemClock.now()).num_seconds().max(0);
    format!("{:<24} {:<32} seen {age}s ago", record.display_name(), record.email)
}

fn health_error(health: PresenceHealth) -> Result<(), StudyhallError> {
    match health {
        PresenceHealth::Ok => Ok(()),
        PresenceHealth::Unavailable(reason) | PresenceHealth::Misconfigured(reason) => {
            Err(StudyhallError::Presence(reason))
        }
    }
}

/// Join the roster and print changes until Ctrl-C.
pub async fn watch(
    backend: &Backend,
    config: &StudyhallConfig,
    principal: Principal,
) -> Result<(), StudyhallError> {
    if !config.presence.enabled {
        info!("Presence is disabled in config, nothing to watch");
        return Ok(());
    }

    let (tracker, mut events) = PresenceTracker::with_events(
        Arc::clone(&backend.store),
        Arc::new(SystemClock),
        tracker_config(&config.presence),
    );
    let tracker = Arc::new(tracker);
    println!("Online as {} ({})", principal.display_name, principal.id);

    let session = PresenceSession::start(Arc::clone(&tracker), principal, Arc::clone(&backend.feed)).await;
    if let PresenceHealth::Misconfigured(reason) = tracker.health().await {
        session.shutdown().await;
        return Err(StudyhallError::Presence(reason));
    }

    for user in tracker.online_users().await {
        println!("  {}", format_user(&user));
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Some(PresenceEvent::UserOnline(user)) => println!("+ {}", format_user(&user)),
                Some(PresenceEvent::UserOffline { display_name, .. }) => println!("- {display_name}"),
                Some(PresenceEvent::RosterRefreshed { online_count }) => {
                    info!(online_count, "Roster refreshed")
                }
                Some(PresenceEvent::Connected) => println!("* live updates connected"),
                Some(PresenceEvent::Disconnected) => println!("* live updates disconnected, polling"),
                Some(PresenceEvent::Unavailable(reason)) => println!("! {reason}"),
                None => break,
            },
        }
    }

    info!("Shutting down presence session");
    session.shutdown().await;
    Ok(())
}

/// Run the table self-test and print the report.
pub async fn check(backend: &Backend) -> Result<(), StudyhallError> {
    let report = check_table(&*backend.store, &SystemClock).await;
    println!("{report}");
    if report.passed() {
        Ok(())
    } else {
        Err(StudyhallError::Presence("presence table check failed".into()))
    }
}

/// Delete stale rows once.
pub async fn sweep(backend: &Backend, config: &StudyhallConfig) -> Result<(), StudyhallError> {
    let tracker = oneshot_tracker(backend, config);
    let removed = tracker.sweep().await;
    health_error(tracker.health().await)?;
    println!("Removed {removed} stale presence row(s)");
    Ok(())
}

/// Print the active snapshot.
pub async fn list(backend: &Backend, config: &StudyhallConfig) -> Result<(), StudyhallError> {
    let tracker = oneshot_tracker(backend, config);
    let users = tracker.snapshot().await;
    health_error(tracker.health().await)?;
    println!("{} user(s) online", users.len());
    for user in &users {
        println!("  {}", format_user(user));
    }
    Ok(())
}
