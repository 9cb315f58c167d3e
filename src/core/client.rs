//! MCP client handle over a single transport

use crate::core::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, ListResourcesResult,
    ListToolsResult, ReadResourceParams, ResourceDefinition, ToolDefinition, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};
use crate::transport::Transport;
use crate::utils::errors::GatewayResult;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct McpClient {
    server: String,
    transport: Arc<dyn Transport>,
}

impl McpClient {
    pub fn new(server: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            server: server.into(),
            transport,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run the MCP handshake: `initialize` followed by `notifications/initialized`
    pub async fn initialize(&self) -> GatewayResult<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request(METHOD_INITIALIZE, Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        self.transport
            .send_notification(JsonRpcRequest::new(METHOD_INITIALIZED, None))
            .await?;

        debug!(
            "Initialized '{}' ({} {}, protocol {})",
            self.server, init.server_info.name, init.server_info.version, init.protocol_version
        );
        Ok(init)
    }

    pub async fn list_tools(&self) -> GatewayResult<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.request(METHOD_TOOLS_LIST, params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!("'{}' repeated tools cursor '{}', stopping", self.server, next);
                    break;
                }
                None => break,
            }
        }

        Ok(tools)
    }

    pub async fn list_resources(&self) -> GatewayResult<Vec<ResourceDefinition>> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListResourcesResult =
                serde_json::from_value(self.request(METHOD_RESOURCES_LIST, params).await?)?;
            resources.extend(page.resources);

            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!("'{}' repeated resources cursor '{}', stopping", self.server, next);
                    break;
                }
                None => break,
            }
        }

        Ok(resources)
    }

    /// Invoke a tool. The result is returned as sent, including `isError` payloads.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> GatewayResult<Value> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        self.request(METHOD_TOOLS_CALL, Some(params)).await
    }

    pub async fn read_resource(&self, uri: &str) -> GatewayResult<Value> {
        let params = serde_json::to_value(ReadResourceParams {
            uri: uri.to_string(),
        })?;
        self.request(METHOD_RESOURCES_READ, Some(params)).await
    }

    pub async fn close(&self) -> GatewayResult<()> {
        self.transport.close().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> GatewayResult<Value> {
        let response = self
            .transport
            .send_request(JsonRpcRequest::new(method, params))
            .await?;
        response.into_result()
    }
}
