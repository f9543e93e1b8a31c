use crate::schema::StudyhallConfig;

use super::helpers::validate_range;

/// Validate presence timing. The heartbeat must fire at least once inside
/// the stale window or every client would be swept between beats.
pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &StudyhallConfig) {
    let presence = &config.presence;

    validate_range(
        errors,
        "presence.stale_window_secs",
        presence.stale_window_secs,
        5,
        3600,
    );
    validate_range(
        errors,
        "presence.heartbeat_interval_secs",
        presence.heartbeat_interval_secs,
        1,
        3600,
    );
    validate_range(
        errors,
        "presence.sweep_interval_secs",
        presence.sweep_interval_secs,
        1,
        3600,
    );
    validate_range(
        errors,
        "presence.poll_interval_secs",
        presence.poll_interval_secs,
        0,
        3600,
    );

    if presence.heartbeat_interval_secs >= presence.stale_window_secs {
        errors.push(format!(
            "presence.heartbeat_interval_secs = {} must be below presence.stale_window_secs = {}",
            presence.heartbeat_interval_secs, presence.stale_window_secs
        ));
    }
}
