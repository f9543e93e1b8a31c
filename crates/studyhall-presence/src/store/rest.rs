//! PostgREST-backed presence store (Supabase `/rest/v1`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{PresenceStore, StoreError, PRESENCE_COLUMNS};
use crate::record::{format_timestamp, PresenceRecord};

/// Build the HTTP client shared by the REST store and the auth client.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .build()
}

/// Presence store talking to PostgREST.
pub struct RestStore {
    base_url: String,
    table: String,
    anon_key: String,
    access_token: Option<String>,
    http: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, table: &str, anon_key: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            anon_key: anon_key.to_string(),
            access_token: None,
            http,
        }
    }

    /// Authenticate requests as a user so row-level security applies to them.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Send and map non-success statuses to a `StoreError`.
    async fn execute(&self, op: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(op, table = %self.table, status = status.as_u16(), "store request ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_response(status.as_u16(), &body))
    }

    async fn returned_ids(response: reqwest::Response) -> Result<Vec<serde_json::Value>, StoreError> {
        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PresenceStore for RestStore {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::POST)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record);
        self.execute("upsert", req).await?;
        Ok(())
    }

    async fn touch(&self, id: &str, last_seen: DateTime<Utc>) -> Result<bool, StoreError> {
        let req = self
            .request(reqwest::Method::PATCH)
            .query(&[("id", format!("eq.{id}")), ("select", "id".to_string())])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "last_seen": format_timestamp(last_seen) }));
        let response = self.execute("touch", req).await?;
        Ok(!Self::returned_ids(response).await?.is_empty())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::DELETE)
            .query(&[("id", format!("eq.{id}"))]);
        self.execute("delete", req).await?;
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let req = self
            .request(reqwest::Method::DELETE)
            .query(&[
                ("last_seen", format!("lt.{}", format_timestamp(cutoff))),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation");
        let response = self.execute("sweep", req).await?;
        Ok(Self::returned_ids(response).await?.len())
    }

    async fn select_all(&self) -> Result<Vec<PresenceRecord>, StoreError> {
        let req = self.request(reqwest::Method::GET).query(&[
            ("select", PRESENCE_COLUMNS),
            ("order", "last_seen.desc"),
        ]);
        let response = self.execute("select", req).await?;
        response
            .json::<Vec<PresenceRecord>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn probe(&self, columns: &str) -> Result<(), StoreError> {
        let req = self
            .request(reqwest::Method::GET)
            .query(&[("select", columns), ("limit", "1")]);
        self.execute("probe", req).await?;
        Ok(())
    }
}
