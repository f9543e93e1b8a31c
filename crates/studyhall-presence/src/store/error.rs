use serde::Deserialize;

/// Failures reported by a presence store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network error, timeout or server-side 5xx.
    #[error("store unreachable: {0}")]
    Transient(String),

    /// Rejected by the store's access policy (RLS or auth).
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The presence table or one of its columns does not exist.
    #[error("presence table missing: {0}")]
    SchemaMissing(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    Decode(String),
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl StoreError {
    /// Classify a non-success PostgREST response.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
        let mut message = parsed
            .message
            .clone()
            .unwrap_or_else(|| body.trim().to_string());
        if let Some(details) = parsed.details.as_deref().filter(|d| !d.is_empty()) {
            message.push_str(&format!(" ({details})"));
        }
        if let Some(hint) = parsed.hint.as_deref().filter(|h| !h.is_empty()) {
            message.push_str(&format!(" hint: {hint}"));
        }

        match parsed.code.as_deref() {
            // undefined_table, undefined_column, schema cache miss
            Some("42P01") | Some("42703") | Some("PGRST204") | Some("PGRST205") => {
                return StoreError::SchemaMissing(message);
            }
            Some("42501") => return StoreError::AccessDenied(message),
            _ => {}
        }

        if message.contains("does not exist") && message.contains("relation") {
            return StoreError::SchemaMissing(message);
        }

        match status {
            401 | 403 => StoreError::AccessDenied(message),
            404 => StoreError::SchemaMissing(message),
            408 | 429 | 500..=599 => StoreError::Transient(format!("status {status}: {message}")),
            _ => StoreError::Rejected { status, message },
        }
    }

    /// Whether the failure should stop all further store traffic.
    pub fn is_configuration_problem(&self) -> bool {
        matches!(self, StoreError::SchemaMissing(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Transient(err.to_string())
        }
    }
}
