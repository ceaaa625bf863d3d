//! Config loading and defaults integration tests

use std::time::Duration;

use rfq_realtime::{Config, RealtimeError};
use tempfile::TempDir;

#[test]
fn test_save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    let config = Config {
        api_base_url: "https://api.example.com/api".to_string(),
        socket_port: 6001,
        namespace: "/rfq".to_string(),
        reconnect_attempts: 3,
        reconnect_delay_ms: 250,
        connect_timeout_ms: 5000,
    };
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);

    let session = loaded.session_config().unwrap();
    assert_eq!(
        session.url,
        "wss://api.example.com:6001/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(session.namespace, "/rfq");
    assert_eq!(session.reconnect_attempts, 3);
    assert_eq!(session.reconnect_delay, Duration::from_millis(250));
    assert_eq!(session.connect_timeout, Duration::from_secs(5));
}

#[test]
fn test_load_empty_file_gives_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    assert_eq!(Config::load(&path).unwrap(), Config::default());
}

#[test]
fn test_load_errors() {
    let temp = TempDir::new().unwrap();

    let missing = Config::load(temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, RealtimeError::Io(_)));

    let path = temp.path().join("bad.toml");
    std::fs::write(&path, "socket_port = \"not a port\"").unwrap();
    let bad = Config::load(&path).unwrap_err();
    assert!(matches!(bad, RealtimeError::Config(_)));
}

#[test]
fn test_bad_api_url_fails_session_config() {
    let config = Config {
        api_base_url: "ftp://files.example.com".to_string(),
        ..Config::default()
    };
    assert!(config.session_config().is_err());
}
