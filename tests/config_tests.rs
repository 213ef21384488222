//! Loading configuration files from disk.

use histmap::utils::config::{ConfigError, HistmapConfig};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_shipped_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/histmap.toml");
    let config = HistmapConfig::load(path).expect("shipped histmap.toml should load");
    let defaults = HistmapConfig::default();

    assert_eq!(config.bind_address(), defaults.bind_address());
    assert_eq!(config.auth.jwt_secret_env, defaults.auth.jwt_secret_env);
    assert_eq!(config.token_ttl(), defaults.token_ttl());
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(
        config.sessions.active_window(),
        defaults.sessions.active_window()
    );
    assert_eq!(
        config.sessions.peak_interval(),
        defaults.sessions.peak_interval()
    );
    assert_eq!(
        config.sessions.metrics_interval(),
        defaults.sessions.metrics_interval()
    );
    assert_eq!(config.sessions.anonymous_retention_days, None);
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
[server]
port = 9090

[database]
url = ":memory:"

[sessions]
anonymous_retention_days = 7
"#
    )
    .expect("write config");

    let config = HistmapConfig::load(file.path()).expect("should load");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.database.url, ":memory:");
    assert_eq!(config.sessions.anonymous_retention_days, Some(7));
}

#[test]
fn test_invalid_file_is_rejected() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "[auth]\ntoken_ttl_hours = 0").expect("write config");

    let err = HistmapConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(msg) if msg.contains("token_ttl_hours")));
}
