//! Per-server session state: connection status, client handle, discovered capabilities

use crate::config::ServerConnectionConfig;
use crate::core::client::McpClient;
use crate::core::protocol::{InitializeResult, ResourceDefinition, ToolDefinition};
use crate::transport::TransportFactory;
use crate::utils::errors::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// A discovered tool plus its running execution counters
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    /// Server that advertised the tool
    pub server_name: String,
    pub discovered_at: DateTime<Utc>,
    pub call_count: u64,
    pub avg_execution_time_ms: f64,
    pub last_execution_status: Option<ExecutionStatus>,
}

impl ToolDescriptor {
    pub fn from_definition(server_name: &str, definition: ToolDefinition) -> Self {
        Self {
            name: definition.name,
            description: definition.description,
            input_schema: definition.input_schema,
            server_name: server_name.to_string(),
            discovered_at: Utc::now(),
            call_count: 0,
            avg_execution_time_ms: 0.0,
            last_execution_status: None,
        }
    }

    /// Minimal descriptor handed to error hooks when the tool was never resolved
    pub fn unresolved(server_name: Option<&str>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            input_schema: Value::Null,
            server_name: server_name.unwrap_or_default().to_string(),
            discovered_at: Utc::now(),
            call_count: 0,
            avg_execution_time_ms: 0.0,
            last_execution_status: None,
        }
    }

    /// The average is blended as `(previous + latest) / 2`, starting from zero.
    pub fn record_success(&mut self, duration_ms: f64) {
        self.call_count += 1;
        self.avg_execution_time_ms = (self.avg_execution_time_ms + duration_ms) / 2.0;
        self.last_execution_status = Some(ExecutionStatus::Success);
    }

    pub fn record_failure(&mut self) {
        self.last_execution_status = Some(ExecutionStatus::Failure);
    }

    fn carry_counters(&mut self, previous: &ToolDescriptor) {
        self.call_count = previous.call_count;
        self.avg_execution_time_ms = previous.avg_execution_time_ms;
        self.last_execution_status = previous.last_execution_status;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub server_name: String,
    pub discovered_at: DateTime<Utc>,
}

impl ResourceDescriptor {
    pub fn from_definition(server_name: &str, definition: ResourceDefinition) -> Self {
        Self {
            uri: definition.uri,
            name: definition.name,
            description: definition.description,
            mime_type: definition.mime_type,
            server_name: server_name.to_string(),
            discovered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub total_tool_calls: u64,
    pub total_resource_reads: u64,
    pub errors: u64,
}

/// One live (or recovering) connection to a tool server.
///
/// The client handle is installed once by [`ServerSession::open`]; tool and
/// resource maps are replaced wholesale on each discovery.
pub struct ServerSession {
    config: ServerConnectionConfig,
    seq: u64,
    status: RwLock<SessionStatus>,
    client: RwLock<Option<McpClient>>,
    server_info: RwLock<Option<InitializeResult>>,
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    resources: RwLock<HashMap<String, ResourceDescriptor>>,
    stats: Mutex<SessionStats>,
}

impl ServerSession {
    /// `seq` orders sessions for first-match tool routing
    pub fn new(config: ServerConnectionConfig, seq: u64) -> Self {
        Self {
            config,
            seq,
            status: RwLock::new(SessionStatus::Connecting),
            client: RwLock::new(None),
            server_info: RwLock::new(None),
            tools: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConnectionConfig {
        &self.config
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    pub fn set_status(&self, status: SessionStatus) {
        let mut current = self.status.write();
        if *current != status {
            debug!("Session '{}' {} -> {}", self.config.name, *current, status);
            *current = status;
        }
        if status == SessionStatus::Disconnected {
            self.stats.lock().disconnected_at = Some(Utc::now());
        }
    }

    /// Open the transport and run the handshake, bounded by `timeout`
    pub async fn open(&self, factory: &dyn TransportFactory, timeout: Duration) -> GatewayResult<()> {
        let name = self.config.name.clone();
        let attempt = async {
            let transport = factory.connect(&self.config).await?;
            let client = McpClient::new(name.clone(), transport);
            match client.initialize().await {
                Ok(init) => Ok((client, init)),
                Err(e) => {
                    if let Err(close_err) = client.close().await {
                        debug!("Closing failed session '{}': {}", name, close_err);
                    }
                    Err(e)
                }
            }
        };

        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
        };

        match outcome {
            Ok((client, init)) => {
                *self.client.write() = Some(client);
                *self.server_info.write() = Some(init);
                self.stats.lock().connected_at = Some(Utc::now());
                self.set_status(SessionStatus::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open session '{}': {}", name, e);
                self.set_status(SessionStatus::Error);
                Err(e)
            }
        }
    }

    pub fn client(&self) -> GatewayResult<McpClient> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| GatewayError::connection(&self.config.name, "session has no client"))
    }

    pub fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.read().clone()
    }

    /// Resolves when the underlying transport shuts down
    pub async fn closed(&self) {
        let client = self.client.read().clone();
        if let Some(client) = client {
            client.transport().closed().await;
        }
    }

    pub async fn close(&self) {
        let client = self.client.read().clone();
        if let Some(client) = client {
            if let Err(e) = client.close().await {
                debug!("Error closing session '{}': {}", self.config.name, e);
            }
        }
        self.set_status(SessionStatus::Disconnected);
    }

    /// Swap in a freshly discovered tool set, keeping counters of tools that survived
    pub fn replace_tools(&self, discovered: Vec<ToolDescriptor>) -> Vec<ToolDescriptor> {
        let mut tools = self.tools.write();
        let mut next = HashMap::with_capacity(discovered.len());
        for mut tool in discovered {
            if let Some(previous) = tools.get(&tool.name) {
                tool.carry_counters(previous);
            }
            next.insert(tool.name.clone(), tool);
        }
        *tools = next;
        tools.values().cloned().collect()
    }

    pub fn replace_resources(&self, discovered: Vec<ResourceDescriptor>) {
        let next = discovered
            .into_iter()
            .map(|r| (r.uri.clone(), r))
            .collect::<HashMap<_, _>>();
        *self.resources.write() = next;
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn has_resource(&self, uri: &str) -> bool {
        self.resources.read().contains_key(uri)
    }

    pub fn tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.read().get(name).cloned()
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources: Vec<_> = self.resources.read().values().cloned().collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        resources
    }

    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.read().len()
    }

    /// Update a tool's counters in place; returns the updated descriptor
    pub fn update_tool<F>(&self, name: &str, update: F) -> Option<ToolDescriptor>
    where
        F: FnOnce(&mut ToolDescriptor),
    {
        let mut tools = self.tools.write();
        tools.get_mut(name).map(|tool| {
            update(tool);
            tool.clone()
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    pub fn record_tool_call(&self) {
        self.stats.lock().total_tool_calls += 1;
    }

    pub fn record_resource_read(&self) {
        self.stats.lock().total_resource_reads += 1;
    }

    pub fn record_error(&self) {
        self.stats.lock().errors += 1;
    }

    pub fn record_reconnect_attempt(&self) -> u32 {
        let mut stats = self.stats.lock();
        stats.reconnect_attempts += 1;
        stats.reconnect_attempts
    }

    /// Carry lifetime counters over from the session this one replaces
    pub fn inherit_stats(&self, previous: &ServerSession) {
        let old = previous.stats();
        let mut stats = self.stats.lock();
        stats.reconnect_attempts = old.reconnect_attempts;
        stats.total_tool_calls = old.total_tool_calls;
        stats.total_resource_reads = old.total_resource_reads;
        stats.errors = old.errors;
    }
}
