//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::LogLevel;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_studyhall_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, studyhall_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[backend]
url = "https://abcd.supabase.co"

[presence]
heartbeat_interval_secs = 5
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.backend.url, "https://abcd.supabase.co");
    assert_eq!(config.presence.heartbeat_interval_secs, 5);
    // Defaults preserved
    assert_eq!(config.backend.table, "online_users");
    assert_eq!(config.presence.stale_window_secs, 30);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, studyhall_common::ConfigError::ParseError(_)));
}

#[test]
fn out_of_range_values_are_returned_unvalidated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[presence]
heartbeat_interval_secs = 0
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.presence.heartbeat_interval_secs, 0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studyhall").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert!(!config.backend.is_remote());
    assert_eq!(config.presence.sweep_interval_secs, 30);
}

#[test]
fn default_config_toml_is_valid() {
    use super::template::default_config_toml;
    use crate::schema::StudyhallConfig;

    let config: StudyhallConfig = toml::from_str(&default_config_toml()).unwrap();
    assert!(config.presence.enabled);
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("studyhall"));
        assert!(path_str.ends_with("config.toml"));
    }
}
