//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# studyhall configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[backend]
# Project URL. Leave empty to run against the in-process memory backend.
# url = "https://<project-ref>.supabase.co"
# anon_key = ""
# table = "online_users"
# channel = "online_users_channel"
# request_timeout_secs = 10   # 1-120

[presence]
# enabled = true
# stale_window_secs = 30        # 5-3600
# heartbeat_interval_secs = 10  # must be below stale_window_secs
# sweep_interval_secs = 30      # 1-3600
# poll_interval_secs = 15       # 0 disables the fallback poll
# verify_table_on_start = true

[logging]
# level = "info"   # trace, debug, info, warn, error
"##
    .to_string()
}
