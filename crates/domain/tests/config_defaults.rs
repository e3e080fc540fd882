use fame_domain::config::{Config, ConfigSeverity};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn spec_defaults_hold() {
    let config = Config::default();
    assert_eq!(config.sessions.max_turns, 5);
    assert_eq!(config.sessions.idle_timeout_secs, 1_800);
    assert_eq!(config.fanout.query_timeout_secs, 60);
    assert_eq!(config.fanout.single_flight_window_ms, 5_000);
    assert_eq!(config.sandbox.wall_ms, 30_000);
    assert_eq!(config.sandbox.memory_mb, 512);
    assert_eq!(config.sandbox.cpu_share, 0.5);
    assert_eq!(config.sandbox.capture_bytes, 64 * 1024);
    assert_eq!(config.safety.audit_capacity, 10_000);
    assert_eq!(config.router.low_threshold, 0.30);
    assert_eq!(config.router.context_boost, 0.30);
    assert_eq!(config.router.max_candidates, 5);
}

#[test]
fn provider_priority_reference_order() {
    let config = Config::default();
    assert_eq!(
        config.fanout.provider_priority,
        vec!["serpapi", "google_cse", "bing", "news"]
    );
}

#[test]
fn partial_toml_fills_defaults() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210

[sessions]
max_turns = 8
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3210);
    assert_eq!(config.sessions.max_turns, 8);
    // Untouched sections keep their defaults.
    assert_eq!(config.sessions.idle_timeout_secs, 1_800);
    assert_eq!(config.fanout.query_timeout_secs, 60);
}

#[test]
fn zero_max_turns_fails_validation() {
    let toml_str = r#"
[sessions]
max_turns = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "sessions.max_turns"));
}

#[test]
fn quarantine_with_empty_allow_list_warns() {
    let toml_str = r#"
[plugins]
quarantine = true
allow_list = []
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Warning && i.field == "plugins.allow_list"));
}

#[test]
fn default_config_validates_clean() {
    let issues = Config::default().validate();
    assert!(
        issues.iter().all(|i| i.severity != ConfigSeverity::Error),
        "default config must not carry validation errors"
    );
}

#[test]
fn sandbox_limits_resolve_from_config() {
    let config = Config::default();
    let limits = config.sandbox.limits();
    assert_eq!(limits.wall.as_millis(), 30_000);
    assert_eq!(limits.memory_bytes, 512 * 1024 * 1024);
}
