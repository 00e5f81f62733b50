use plugin_serve::config::{AnnouncePolicy, ProjectConfig, config_path, load, save};
use plugin_serve::tasks::starter_config;

#[test]
fn load_defaults_when_missing() {
    let temp = tempfile::tempdir().unwrap();
    let config = load(temp.path()).unwrap();
    assert!(config.port.is_none());
    assert!(config.binaries.tunnel.is_none());
}

#[test]
fn save_and_load_roundtrip() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = ProjectConfig {
        port: Some(9000),
        announce: Some(AnnouncePolicy::First),
        ..ProjectConfig::default()
    };
    config.binaries.http_server = Some("simple-http-server".to_string());
    save(temp.path(), &config).unwrap();

    assert!(config_path(temp.path()).exists());
    let loaded = load(temp.path()).unwrap();
    assert_eq!(loaded.port, Some(9000));
    assert_eq!(loaded.announce, Some(AnnouncePolicy::First));
    assert_eq!(
        loaded.binaries.http_server.as_deref(),
        Some("simple-http-server")
    );
}

#[test]
fn parses_hand_written_file() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(
        config_path(temp.path()),
        "relay: relay.example\nstartup_timeout_ms: 250\nartifact:\n  max_depth: 5\nhttp_server_args: [\"{dir}\", \"-p\", \"{port}\"]\n",
    )
    .unwrap();
    let loaded = load(temp.path()).unwrap();
    assert_eq!(loaded.relay.as_deref(), Some("relay.example"));
    assert_eq!(loaded.startup_timeout_ms, Some(250));
    assert_eq!(loaded.artifact.max_depth, Some(5));
    assert_eq!(loaded.http_server_args.unwrap().len(), 3);
}

#[test]
fn invalid_file_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(config_path(temp.path()), "port: not-a-number\n").unwrap();
    let err = load(temp.path()).unwrap_err();
    assert!(err.to_string().contains("invalid config"));
}

#[test]
fn starter_config_survives_roundtrip() {
    let temp = tempfile::tempdir().unwrap();
    save(temp.path(), &starter_config()).unwrap();
    let loaded = load(temp.path()).unwrap();
    assert_eq!(loaded.port, Some(8000));
    assert_eq!(loaded.relay.as_deref(), Some("bore.pub"));
    assert_eq!(loaded.binaries.tunnel.as_deref(), Some("bore"));
}
