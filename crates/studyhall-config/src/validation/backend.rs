use crate::schema::StudyhallConfig;

use super::helpers::{validate_non_empty, validate_range};

/// Validate backend connection settings.
pub(crate) fn validate_backend(errors: &mut Vec<String>, config: &StudyhallConfig) {
    let backend = &config.backend;

    validate_non_empty(errors, "backend.table", &backend.table);
    validate_non_empty(errors, "backend.channel", &backend.channel);
    validate_range(
        errors,
        "backend.request_timeout_secs",
        backend.request_timeout_secs,
        1,
        120,
    );

    if backend.is_remote() {
        let url = backend.url.trim();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            errors.push(format!("backend.url = {url:?} must start with http:// or https://"));
        }
        validate_non_empty(errors, "backend.anon_key", &backend.anon_key);
    }
}
