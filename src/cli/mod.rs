//! CLI command implementations

pub mod args;

pub use args::{CallArgs, Cli, Command, DiscoverArgs, RouteArgs, ValidateArgs};

use crate::config::{Config, ConfigFormat, ConfigLoader, ConfigValidator};
use crate::core::manager::ConnectionManager;
use crate::core::types::ToolExecutionRequest;
use crate::orchestrator::{InMemoryAgentDirectory, Task, TaskRouter};
use crate::utils::errors::{GatewayError, GatewayResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Parse `key=value` / `key:value` pairs. Values that parse as JSON keep
/// their type; bare words become `true`.
pub fn parse_call_args(args: &[String]) -> GatewayResult<Map<String, Value>> {
    let mut map = Map::new();

    for arg in args {
        let pair = arg.split_once('=').or_else(|| arg.split_once(':'));
        let Some((key, value)) = pair else {
            map.insert(arg.clone(), Value::Bool(true));
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(GatewayError::Validation(format!("missing key in '{}'", arg)));
        }
        let value = value.trim();
        let parsed = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.to_string(), parsed);
    }

    Ok(map)
}

/// Split `server.tool` when the prefix names a configured server
pub fn split_target<'a>(config: &Config, target: &'a str) -> (Option<&'a str>, &'a str) {
    if let Some((server, tool)) = target.split_once('.') {
        if config.servers.iter().any(|s| s.name == server) {
            return (Some(server), tool);
        }
    }
    (None, target)
}

/// Read a task from inline JSON or `@path`
pub async fn read_task(source: &str) -> GatewayResult<Task> {
    let content = match source.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(ConfigLoader::expand_path(path)).await?,
        None => source.to_string(),
    };
    Ok(serde_json::from_str(&content)?)
}

fn print_json<T: Serialize>(value: &T) -> GatewayResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connected_manager(config: &Config) -> ConnectionManager {
    let manager = ConnectionManager::from_config(config);
    for (name, result) in manager.connect_all(config.servers.clone()).await {
        if let Err(e) = result {
            warn!("Skipping server '{}': {}", name, e);
        }
    }
    manager
}

pub async fn validate(config_path: &str, args: &ValidateArgs) -> GatewayResult<bool> {
    let validator = ConfigValidator::new();
    if args.schema {
        println!("{}", validator.export_schema());
        return Ok(true);
    }

    let path = ConfigLoader::expand_path(config_path);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| GatewayError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;
    let format = ConfigFormat::detect(&path, &content);

    let errors = validator.validate_str(&content, format).err().unwrap_or_default();
    if args.format == "json" {
        print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "errors": errors,
        }))?;
    } else if errors.is_empty() {
        println!("{} is valid", path.display());
    } else {
        println!("{} has {} problem(s):", path.display(), errors.len());
        for error in &errors {
            println!("  - {}", error);
        }
    }

    Ok(errors.is_empty())
}

pub async fn discover(config: &Config, args: &DiscoverArgs) -> GatewayResult<()> {
    let servers: Vec<_> = config
        .servers
        .iter()
        .filter(|s| args.server.as_deref().map_or(true, |name| s.name == name))
        .cloned()
        .collect();
    if servers.is_empty() {
        return Err(GatewayError::Config("no matching servers configured".to_string()));
    }

    let scoped = Config {
        servers,
        ..config.clone()
    };
    let manager = connected_manager(&scoped).await;

    let mut report = BTreeMap::new();
    for name in manager.list_servers() {
        let tools = match manager.discover_tools(&name).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Tool discovery failed for '{}': {}", name, e);
                Vec::new()
            }
        };
        let mut entry = serde_json::json!({ "tools": tools });
        if args.resources {
            entry["resources"] = serde_json::to_value(manager.resources(Some(&name)))?;
        }
        report.insert(name, entry);
    }

    manager.disconnect_all().await;
    print_json(&report)
}

pub async fn call(config: &Config, args: &CallArgs) -> GatewayResult<bool> {
    let (server, tool) = split_target(config, &args.target);

    let mut arguments = match &args.json {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(GatewayError::Validation("--json must be an object".to_string())),
        },
        None => Map::new(),
    };
    arguments.extend(parse_call_args(&args.args)?);

    let mut request = ToolExecutionRequest::new(tool, Value::Object(arguments));
    if let Some(server) = server {
        request = request.on_server(server);
    }
    if let Some(timeout) = args.timeout {
        request = request.with_timeout_ms(timeout);
    }

    let manager = connected_manager(config).await;
    let result = manager.execute_tool(request).await;
    manager.disconnect_all().await;

    let response = result?;
    print_json(&response)?;
    Ok(response.success)
}

pub async fn route(config: &Config, args: &RouteArgs) -> GatewayResult<()> {
    let task = read_task(&args.task).await?;
    let manager = connected_manager(config).await;
    let router = TaskRouter::new(config.router.clone())
        .with_connection_manager(manager.clone())
        .with_agent_directory(Arc::new(InMemoryAgentDirectory::new(config.agents.clone())));

    let result = if args.plan {
        router.plan(&task).await.and_then(|route| print_json(&route))
    } else {
        info!("Routing task {}", task.id);
        match router.execute(task).await {
            Ok(outcome) => print_json(&outcome),
            Err(e) => Err(e),
        }
    };

    manager.disconnect_all().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConnectionConfig;
    use serde_json::json;

    #[test]
    fn test_parse_call_args() {
        let args = vec![
            "path=/tmp/a.txt".to_string(),
            "limit:10".to_string(),
            "recursive".to_string(),
            "filter={\"ext\":\"rs\"}".to_string(),
        ];
        let map = parse_call_args(&args).unwrap();

        assert_eq!(map["path"], json!("/tmp/a.txt"));
        assert_eq!(map["limit"], json!(10));
        assert_eq!(map["recursive"], json!(true));
        assert_eq!(map["filter"]["ext"], json!("rs"));
    }

    #[test]
    fn test_parse_call_args_rejects_empty_key() {
        assert!(parse_call_args(&["=5".to_string()]).is_err());
    }

    #[test]
    fn test_split_target_requires_known_server() {
        let config = Config {
            servers: vec![ServerConnectionConfig::tcp("fs", "127.0.0.1:9000")],
            ..Config::default()
        };

        assert_eq!(split_target(&config, "fs.read_file"), (Some("fs"), "read_file"));
        assert_eq!(split_target(&config, "v1.read_file"), (None, "v1.read_file"));
        assert_eq!(split_target(&config, "read_file"), (None, "read_file"));
    }

    #[tokio::test]
    async fn test_read_task_inline() {
        let task = read_task(r#"{"type":"tool","tool":"read_file"}"#).await.unwrap();
        assert_eq!(task.tool.as_deref(), Some("read_file"));
    }
}
