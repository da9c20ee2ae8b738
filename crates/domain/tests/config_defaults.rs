use cb_domain::config::{ArtifactPolicy, Config};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_port_matches_legacy_deployments() {
    let config = Config::default();
    assert_eq!(config.server.port, 10000);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn cors_config_parses_custom_origins() {
    let toml_str = r#"
[server.cors]
allowed_origins = ["https://2wix.ru", "http://localhost:5173", "http://localhost:3000"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.cors.allowed_origins.len(), 3);
    assert!(config.server.cors.allowed_origins.contains(&"https://2wix.ru".to_string()));
}

#[test]
fn full_config_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080

[sessions]
dir = "/data/sessions"
resume_on_start = true
artifact_policy = "clear_on_reconnect"

[sessions.reconnect]
initial_delay_ms = 500
max_attempts = 10

[pairing]
wait_timeout_ms = 15000
block_on_create = true

[engine]
bridge_url = "ws://bridge:8085/sessions"
address_suffix = "@c.us"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 8080);
    assert!(config.sessions.resume_on_start);
    assert_eq!(config.sessions.artifact_policy, ArtifactPolicy::ClearOnReconnect);
    assert_eq!(config.sessions.reconnect.max_attempts, 10);
    assert_eq!(config.pairing.wait_timeout_ms, 15000);
    assert!(config.pairing.block_on_create);
    assert_eq!(config.engine.address_suffix, "@c.us");
    assert_eq!(config.engine.handshake_timeout_secs, 10);
    assert!(config.validate().is_empty());
}

#[test]
fn empty_file_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.engine.bridge_url, "ws://127.0.0.1:8085/sessions");
    assert_eq!(config.engine.address_suffix, "@s.whatsapp.net");
    assert_eq!(config.sessions.dir, std::path::PathBuf::from("./sessions"));
}
