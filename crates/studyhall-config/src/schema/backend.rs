//! Hosted backend connection settings.

use serde::{Deserialize, Serialize};

/// Connection settings for the hosted backend (Supabase).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`. Empty selects the
    /// in-process memory backend.
    pub url: String,
    /// Publishable anon key.
    pub anon_key: String,
    /// Table holding presence rows.
    pub table: String,
    /// Realtime channel name used for the table's change feed.
    pub channel: String,
    /// HTTP request timeout in seconds (valid range: 1-120).
    pub request_timeout_secs: u32,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("table", &self.table)
            .field("channel", &self.channel)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            table: "online_users".into(),
            channel: "online_users_channel".into(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Whether a hosted backend is configured at all.
    pub fn is_remote(&self) -> bool {
        !self.url.trim().is_empty()
    }
}
