//! Configuration loading and validation tests

use agentlink::config::{
    Config, ConfigFormat, ConfigLoader, ConfigValidator, LogFormat, ServerConnectionConfig,
    TransportConfig,
};
use agentlink::core::ConnectionManager;
use tempfile::TempDir;
use tokio::fs;
use tokio_test::assert_err;

#[tokio::test]
async fn test_load_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let config_content = r#"
[manager]
max_concurrent_executions = 4
tool_cache_ttl_ms = 1000

[circuit_breaker]
failure_threshold = 2

[logging]
level = "debug"
format = "json"

[[servers]]
name = "filesystem"
transport = { type = "stdio", command = "npx", args = ["-y", "server-filesystem", "/tmp"] }
timeout_ms = 5000

[[servers]]
name = "search"
transport = { type = "tcp", address = "127.0.0.1:7000" }
auto_reconnect = false

[[agents]]
id = "thinker"
capabilities = ["reasoning"]
"#;
    fs::write(&config_path, config_content).await.unwrap();

    let config = ConfigLoader::load(&config_path).await.unwrap();

    assert_eq!(config.manager.max_concurrent_executions, 4);
    assert_eq!(config.manager.default_timeout_ms, 30_000);
    assert_eq!(config.circuit_breaker.failure_threshold, 2);
    assert_eq!(config.circuit_breaker.success_threshold, 2);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.servers[0].timeout_ms, Some(5000));
    assert!(config.servers[0].auto_reconnect);
    assert!(!config.servers[1].auto_reconnect);
    assert_eq!(config.servers[1].transport.kind(), "tcp");
    assert_eq!(config.agents[0].capabilities, vec!["reasoning".to_string()]);

    let manager = ConnectionManager::from_config(&config);
    assert_eq!(manager.config().max_concurrent_executions, 4);
}

#[tokio::test]
async fn test_load_yaml_and_json_configs() {
    let temp_dir = TempDir::new().unwrap();

    let yaml_path = temp_dir.path().join("config.yaml");
    fs::write(
        &yaml_path,
        r#"
servers:
  - name: fs
    transport:
      type: stdio
      command: mcp-fs
router:
  sender_id: planner
"#,
    )
    .await
    .unwrap();
    let yaml = ConfigLoader::load(&yaml_path).await.unwrap();
    assert_eq!(yaml.servers[0].name, "fs");
    assert_eq!(yaml.router.sender_id, "planner");
    assert_eq!(yaml.router.default_tool, "read_file");

    let json_path = temp_dir.path().join("gateway.conf");
    fs::write(
        &json_path,
        r#"{"servers": [{"name": "remote", "transport": {"type": "tcp", "address": "10.0.0.2:9000"}}]}"#,
    )
    .await
    .unwrap();
    let json = ConfigLoader::load(&json_path).await.unwrap();
    assert_eq!(
        json.servers[0].transport,
        TransportConfig::Tcp {
            address: "10.0.0.2:9000".to_string()
        }
    );
}

#[tokio::test]
async fn test_save_then_load_keeps_servers() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("saved.toml");

    let config = Config {
        servers: vec![ServerConnectionConfig::tcp("remote", "127.0.0.1:9000").with_timeout_ms(250)],
        ..Config::default()
    };
    ConfigLoader::save(&path, &config).await.unwrap();

    let loaded = ConfigLoader::load(&path).await.unwrap();
    assert_eq!(loaded.servers[0].name, "remote");
    assert_eq!(loaded.servers[0].timeout_ms, Some(250));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[manager]
max_concurrent_executions = 0
"#,
    )
    .await
    .unwrap();

    assert_err!(ConfigLoader::load(&path).await);
}

#[test]
fn test_validator_reports_every_problem() {
    let validator = ConfigValidator::new();
    let content = r#"
[circuit_breaker]
failure_threshold = 0

[router]
fallback_confidence = 1.5

[[servers]]
name = "dup"
transport = { type = "stdio", command = "" }

[[servers]]
name = "dup"
transport = { type = "tcp", address = "127.0.0.1:1" }
timeout_ms = 0
"#;

    let errors = validator.validate_str(content, ConfigFormat::Toml).unwrap_err();
    let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();

    assert!(paths.contains(&"circuit_breaker.failure_threshold"));
    assert!(paths.contains(&"router.fallback_confidence"));
    assert!(paths.contains(&"servers[0].transport.command"));
    assert!(paths.contains(&"servers[1].name"));
    assert!(paths.contains(&"servers[1].timeout_ms"));
}

#[test]
fn test_parse_error_is_reported_at_root() {
    let errors = ConfigValidator::new()
        .validate_str("servers = [", ConfigFormat::Toml)
        .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "root");
}

#[test]
fn test_schema_describes_sections() {
    let validator = ConfigValidator::new();
    let schema = validator.get_schema();
    let properties = &schema["properties"];

    for section in ["manager", "circuit_breaker", "router", "logging", "servers", "agents"] {
        assert!(properties.get(section).is_some(), "missing {}", section);
    }
    assert!(validator.export_schema().contains("ServerConnectionConfig"));
}

#[test]
fn test_default_config_is_valid() {
    assert!(ConfigValidator::new().validate(&Config::default()).is_ok());
}
