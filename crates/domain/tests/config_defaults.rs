use std::time::Duration;

use bc_domain::config::{AgentConfig, Region};

#[test]
fn default_endpoint_is_hosted_cable() {
    let config = AgentConfig::default();
    assert_eq!(config.endpoint_url(), "wss://www.birdcmd.com/cable");
}

#[test]
fn default_session_timing() {
    let config = AgentConfig::default();
    assert_eq!(config.session.heartbeat_interval(), Duration::from_secs(45));
    assert_eq!(config.session.heartbeat_jitter(), Duration::from_secs(5));
    assert_eq!(config.session.reconnect_interval(), Duration::from_secs(10));
    assert_eq!(
        config.session.reconnect_jitter(),
        (Duration::from_secs(1), Duration::from_secs(10))
    );
}

#[test]
fn default_exec_timeout_is_short() {
    let config = AgentConfig::default();
    assert!(!config.exec.long_running);
    assert_eq!(config.exec.timeout(), Duration::from_secs(10));
}

#[test]
fn long_running_timeout() {
    let toml_str = r#"
[exec]
long_running = true
"#;
    let config = AgentConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.exec.timeout(), Duration::from_secs(600));
    assert_eq!(config.exec.max_concurrent, 16);
}

#[test]
fn credentials_and_region_parse() {
    let toml_str = r#"
token = "12a7W55y"
tunnel_id = "ffe9-eew3"

[server]
region = "cn"
"#;
    let config = AgentConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.token, "12a7W55y");
    assert_eq!(config.tunnel_id, "ffe9-eew3");
    assert_eq!(config.server.region, Region::Cn);
    assert_eq!(config.endpoint_url(), "wss://bird.gfgf.work/cable");
}

#[test]
fn partial_session_section_keeps_other_defaults() {
    let toml_str = r#"
[session]
heartbeat_interval_secs = 30
"#;
    let config = AgentConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.session.heartbeat_interval_secs, 30);
    assert_eq!(config.session.heartbeat_jitter_secs, 5);
    assert_eq!(config.session.reconnect_interval_secs, 10);
}

#[test]
fn dev_mode_in_file_overrides_endpoint() {
    let toml_str = r#"
dev_mode = true

[server]
host = "example.org"
"#;
    let config = AgentConfig::from_toml_str(toml_str).unwrap().resolve();
    assert_eq!(config.endpoint_url(), "ws://localhost:3000/cable");
}

#[test]
fn unknown_region_is_rejected() {
    let toml_str = r#"
[server]
region = "mars"
"#;
    assert!(AgentConfig::from_toml_str(toml_str).is_err());
}

#[test]
fn load_reports_missing_file() {
    let err = AgentConfig::load("/definitely/not/here.toml").unwrap_err();
    assert!(err.to_string().contains("not/here.toml"));
}
