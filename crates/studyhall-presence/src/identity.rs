//! Authenticated principals and the Supabase Auth lookup that produces them.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// An authenticated user identity.
#[derive(Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub display_name: String,
    /// Supabase Auth JWT used for row-level-security checks.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl Principal {
    /// Build a principal, deriving the display name the way profiles do:
    /// `full_name`, then the local part of the email, then `"User"`.
    pub fn new(id: impl Into<String>, email: impl Into<String>, full_name: Option<&str>) -> Self {
        let email = email.into();
        let display_name = resolve_display_name(full_name, &email);
        Self {
            id: id.into(),
            email,
            display_name,
            access_token: None,
        }
    }

    /// A throwaway identity for offline use.
    pub fn anonymous(display_name: &str) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), "", Some(display_name))
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

fn resolve_display_name(full_name: Option<&str>, email: &str) -> String {
    if let Some(name) = full_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => "User".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Auth client
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no authenticated user: {0}")]
    Unauthenticated(String),

    #[error("auth request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected auth response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

/// Client for the Supabase Auth user endpoint.
pub struct AuthClient {
    base_url: String,
    anon_key: String,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(base_url: &str, anon_key: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            http,
        }
    }

    /// Resolve the principal that owns `access_token`.
    pub async fn current_principal(&self, access_token: &str) -> Result<Principal, AuthError> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Unauthenticated(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(AuthError::Decode(format!("status {status}")));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;
        debug!(user_id = %user.id, "resolved authenticated user");
        Ok(principal_from_user(user).with_access_token(access_token))
    }
}

fn principal_from_user(user: AuthUser) -> Principal {
    let full_name = user
        .user_metadata
        .get("full_name")
        .and_then(|n| n.as_str());
    Principal::new(user.id, user.email.unwrap_or_default(), full_name)
}
