//! Backend selection: the hosted Supabase project, or an in-process store
//! when no project URL is configured.

use std::sync::Arc;
use std::time::Duration;

use studyhall_common::StudyhallError;
use studyhall_config::schema::{BackendConfig, PresenceConfig};
use studyhall_presence::{
    build_http_client, AuthClient, ChangeFeed, MemoryStore, PresenceStore, Principal,
    RealtimeConfig, RealtimeFeed, RestStore, TrackerConfig,
};
use tracing::{info, warn};

/// Store, change feed and identity lookup for one process.
pub struct Backend {
    pub store: Arc<dyn PresenceStore>,
    pub feed: Arc<dyn ChangeFeed>,
    auth: Option<AuthClient>,
    access_token: Option<String>,
}

impl Backend {
    pub fn from_config(
        config: &BackendConfig,
        access_token: Option<String>,
    ) -> Result<Self, StudyhallError> {
        if !config.is_remote() {
            info!("No backend URL configured, using the in-process presence store");
            let store = MemoryStore::new();
            let feed = Arc::new(store.feed());
            return Ok(Self {
                store,
                feed,
                auth: None,
                access_token: None,
            });
        }

        if access_token.is_none() {
            warn!("STUDYHALL_ACCESS_TOKEN is not set; requests use the anon key only");
        }

        let http = build_http_client(Duration::from_secs(config.request_timeout_secs.into()))
            .map_err(|e| StudyhallError::Other(format!("failed to build HTTP client: {e}")))?;

        let store = RestStore::new(&config.url, &config.table, &config.anon_key, http.clone())
            .with_access_token(access_token.clone());
        let feed = RealtimeFeed::new(
            RealtimeConfig {
                url: config.url.clone(),
                api_key: config.anon_key.clone(),
                access_token: access_token.clone(),
                ..RealtimeConfig::default()
            },
            &config.channel,
            &config.table,
        );
        info!(url = %config.url, table = %config.table, "Using hosted presence backend");

        Ok(Self {
            store: Arc::new(store),
            feed: Arc::new(feed),
            auth: Some(AuthClient::new(&config.url, &config.anon_key, http)),
            access_token,
        })
    }

    /// Resolve the session's principal. With an access token the hosted auth
    /// service decides; otherwise the command-line identity is used, or a
    /// fresh anonymous one.
    pub async fn principal(
        &self,
        user_id: Option<String>,
        email: Option<String>,
        name: Option<String>,
    ) -> Result<Principal, StudyhallError> {
        if let (Some(auth), Some(token)) = (&self.auth, &self.access_token) {
            return auth
                .current_principal(token)
                .await
                .map_err(|e| StudyhallError::Auth(e.to_string()));
        }
        Ok(match user_id {
            Some(id) => Principal::new(id, email.unwrap_or_default(), name.as_deref()),
            None => Principal::anonymous(name.as_deref().unwrap_or("Guest")),
        })
    }
}

/// Convert the configured seconds into tracker timings.
pub fn tracker_config(config: &PresenceConfig) -> TrackerConfig {
    let secs = |s: u32| Duration::from_secs(u64::from(s));
    TrackerConfig {
        stale_window: secs(config.stale_window_secs),
        heartbeat_interval: secs(config.heartbeat_interval_secs),
        sweep_interval: secs(config.sweep_interval_secs),
        poll_interval: (config.poll_interval_secs > 0).then(|| secs(config.poll_interval_secs)),
        verify_table_on_start: config.verify_table_on_start,
    }
}
