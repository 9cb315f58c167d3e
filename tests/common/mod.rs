//! In-process MCP servers for driving the connection manager end-to-end

#![allow(dead_code)]

use agentlink::config::ServerConnectionConfig;
use agentlink::core::circuit_breaker::CircuitBreakerConfig;
use agentlink::core::manager::{ConnectionManager, ConnectionManagerConfig};
use agentlink::core::protocol::{
    JsonRpcRequest, JsonRpcResponse, RequestId, METHOD_INITIALIZE, METHOD_RESOURCES_LIST,
    METHOD_RESOURCES_READ, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION,
};
use agentlink::core::GatewayEvent;
use agentlink::transport::{Transport, TransportFactory};
use agentlink::utils::errors::{GatewayError, GatewayResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Scripted tool server. Tools answer with the arguments they received.
pub struct MockServer {
    name: String,
    tools: Vec<String>,
    resources: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
    list_tools_calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    links: Mutex<Vec<Arc<watch::Sender<bool>>>>,
}

impl MockServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            resources: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            list_tools_calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
            failing: AtomicBool::new(false),
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools.extend(tools.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_resource(mut self, uri: &str, text: &str) -> Self {
        self.resources.insert(uri.to_string(), text.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls.lock().get(tool).copied().unwrap_or(0)
    }

    pub fn list_tools_calls(&self) -> usize {
        self.list_tools_calls.load(Ordering::SeqCst)
    }

    /// Hold every tool call for this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Make tool calls answer with a JSON-RPC error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Close every open transport from the server side
    pub fn drop_connections(&self) {
        for link in self.links.lock().drain(..) {
            link.send_replace(true);
        }
    }

    fn attach(&self, link: Arc<watch::Sender<bool>>) {
        self.links.lock().push(link);
    }

    async fn handle(&self, request: &JsonRpcRequest, id: RequestId) -> JsonRpcResponse {
        let params = request.params.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            METHOD_INITIALIZE => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {}, "resources": {} },
                    "serverInfo": { "name": self.name, "version": "0.0.1" },
                }),
            ),
            METHOD_TOOLS_LIST => {
                self.list_tools_calls.fetch_add(1, Ordering::SeqCst);
                let tools: Vec<Value> = self
                    .tools
                    .iter()
                    .map(|t| json!({ "name": t, "inputSchema": { "type": "object" } }))
                    .collect();
                JsonRpcResponse::success(id, json!({ "tools": tools }))
            }
            METHOD_RESOURCES_LIST => {
                let resources: Vec<Value> = self
                    .resources
                    .keys()
                    .map(|uri| json!({ "uri": uri }))
                    .collect();
                JsonRpcResponse::success(id, json!({ "resources": resources }))
            }
            METHOD_TOOLS_CALL => {
                let tool = params["name"].as_str().unwrap_or_default().to_string();
                *self.calls.lock().entry(tool.clone()).or_insert(0) += 1;

                let delay = *self.delay.lock();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if self.failing.load(Ordering::SeqCst) {
                    return JsonRpcResponse::error(id, -32000, format!("{} failed", tool));
                }
                if !self.tools.contains(&tool) {
                    return JsonRpcResponse::error(id, -32602, format!("unknown tool {}", tool));
                }
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": format!("{} ok", tool) }],
                        "arguments": params["arguments"],
                    }),
                )
            }
            METHOD_RESOURCES_READ => {
                let uri = params["uri"].as_str().unwrap_or_default();
                match self.resources.get(uri) {
                    Some(text) => JsonRpcResponse::success(
                        id,
                        json!({ "contents": [{ "uri": uri, "text": text }] }),
                    ),
                    None => JsonRpcResponse::error(id, -32002, format!("no resource {}", uri)),
                }
            }
            other => JsonRpcResponse::error(id, -32601, format!("method not found: {}", other)),
        }
    }
}

/// One client connection to a [`MockServer`]
pub struct MockTransport {
    server: Arc<MockServer>,
    link: Arc<watch::Sender<bool>>,
    next_id: AtomicI64,
}

impl MockTransport {
    pub fn new(server: Arc<MockServer>) -> Self {
        let (link, _) = watch::channel(false);
        let link = Arc::new(link);
        server.attach(link.clone());
        Self {
            server,
            link,
            next_id: AtomicI64::new(1),
        }
    }

    fn is_closed(&self) -> bool {
        *self.link.borrow()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> GatewayResult<JsonRpcResponse> {
        if self.is_closed() {
            return Err(GatewayError::Transport("transport closed".to_string()));
        }
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst)));
        Ok(self.server.handle(&request, id).await)
    }

    async fn send_notification(&self, _request: JsonRpcRequest) -> GatewayResult<()> {
        if self.is_closed() {
            return Err(GatewayError::Transport("transport closed".to_string()));
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.is_closed()
    }

    async fn close(&self) -> GatewayResult<()> {
        self.link.send_replace(true);
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.link.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Hands out [`MockTransport`]s by server name
#[derive(Default)]
pub struct MockTransportFactory {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
    connects: AtomicUsize,
    refuse: AtomicBool,
    next_connect_delay: Mutex<Option<Duration>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, server: MockServer) -> Arc<MockServer> {
        let server = Arc::new(server);
        self.servers
            .lock()
            .insert(server.name().to_string(), server.clone());
        server
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Stall only the next connection attempt
    pub fn delay_next_connect(&self, delay: Duration) {
        *self.next_connect_delay.lock() = Some(delay);
    }

    /// Refuse every connection from now on
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn connect(&self, config: &ServerConnectionConfig) -> GatewayResult<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.next_connect_delay.lock().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        let server = self
            .servers
            .lock()
            .get(&config.name)
            .cloned()
            .ok_or_else(|| GatewayError::Transport(format!("no server named {}", config.name)))?;
        Ok(Arc::new(MockTransport::new(server)))
    }
}

pub fn manager_with(
    factory: Arc<MockTransportFactory>,
    config: ConnectionManagerConfig,
    breaker: CircuitBreakerConfig,
) -> ConnectionManager {
    ConnectionManager::new(config, breaker, factory)
}

pub fn default_manager(factory: Arc<MockTransportFactory>) -> ConnectionManager {
    manager_with(
        factory,
        ConnectionManagerConfig::default(),
        CircuitBreakerConfig::default(),
    )
}

/// Server config that never reconnects
pub fn server(name: &str) -> ServerConnectionConfig {
    ServerConnectionConfig::tcp(name, "mock").with_auto_reconnect(false)
}

/// Wait for the first event matching `pred`, giving up after two seconds
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<GatewayEvent>,
    mut pred: F,
) -> Option<GatewayEvent>
where
    F: FnMut(&GatewayEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
