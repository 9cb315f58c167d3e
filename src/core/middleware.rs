//! Hooks run around every tool execution

use crate::core::session::ToolDescriptor;
use crate::core::types::ToolExecutionResponse;
use crate::utils::errors::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Pre/post/error hooks. Pre hooks run in registration order and may rewrite
/// the arguments; post and error hooks only observe.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn before_execute(&self, _tool: &ToolDescriptor, arguments: Value) -> GatewayResult<Value> {
        Ok(arguments)
    }

    async fn after_execute(&self, _tool: &ToolDescriptor, _response: &ToolExecutionResponse) {}

    async fn on_error(&self, _tool: &ToolDescriptor, _error: &GatewayError) {}
}

/// Logs every execution through `tracing`
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl ToolMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_execute(&self, tool: &ToolDescriptor, arguments: Value) -> GatewayResult<Value> {
        debug!("Calling {}::{} with {}", tool.server_name, tool.name, arguments);
        Ok(arguments)
    }

    async fn after_execute(&self, tool: &ToolDescriptor, response: &ToolExecutionResponse) {
        debug!(
            "{}::{} finished in {}ms (calls: {})",
            response.server_name, tool.name, response.duration_ms, tool.call_count
        );
    }

    async fn on_error(&self, tool: &ToolDescriptor, error: &GatewayError) {
        warn!("{}::{} failed: {}", tool.server_name, tool.name, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl ToolMiddleware for Noop {
        fn name(&self) -> &str {
            "noop"
        }
    }

    #[tokio::test]
    async fn test_default_hooks_pass_arguments_through() {
        let tool = ToolDescriptor::unresolved(Some("fs"), "read_file");
        let args = json!({"path": "README.md"});

        let out = Noop.before_execute(&tool, args.clone()).await.unwrap();
        assert_eq!(out, args);
        Noop.on_error(&tool, &GatewayError::Timeout(5)).await;

        let logged = LoggingMiddleware.before_execute(&tool, args.clone()).await.unwrap();
        assert_eq!(logged, args);
    }
}
