//! Tool connection manager
//!
//! Owns every server session, the discovery cache and the breaker registry.
//! Tool calls pass through admission (global concurrency cap), server
//! resolution, the breaker gate, the middleware chain and a timeout race.

use crate::config::{Config, ServerConnectionConfig};
use crate::core::cache::ToolCache;
use crate::core::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
use crate::core::events::{EventBus, GatewayEvent};
use crate::core::middleware::ToolMiddleware;
use crate::core::session::{ResourceDescriptor, ServerSession, SessionStatus, ToolDescriptor};
use crate::core::types::{
    ManagerStats, ResourceReadRequest, ResourceReadResponse, ServerStatus, ToolExecutionRequest,
    ToolExecutionResponse,
};
use crate::transport::{DefaultTransportFactory, TransportFactory};
use crate::utils::errors::{GatewayError, GatewayResult};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct ConnectionManagerConfig {
    /// Request timeout when neither the call nor the server sets one
    #[validate(range(min = 1))]
    pub default_timeout_ms: u64,
    pub enable_tool_caching: bool,
    pub tool_cache_ttl_ms: u64,
    /// Discover tools and resources right after each (re)connect
    pub auto_discover_tools: bool,
    #[validate(range(min = 1))]
    pub max_concurrent_executions: usize,
    /// Buffer of the event broadcast channel
    #[validate(range(min = 1))]
    pub event_capacity: usize,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            enable_tool_caching: true,
            tool_cache_ttl_ms: 300_000,
            auto_discover_tools: true,
            max_concurrent_executions: 10,
            event_capacity: 256,
        }
    }
}

struct ManagerInner {
    config: ConnectionManagerConfig,
    sessions: DashMap<String, Arc<ServerSession>>,
    breakers: Arc<CircuitBreakerManager>,
    cache: ToolCache,
    middleware: RwLock<Vec<Arc<dyn ToolMiddleware>>>,
    events: EventBus,
    factory: Arc<dyn TransportFactory>,
    in_flight: AtomicUsize,
    sequence: AtomicU64,
    /// One token per connected name; cancelling it stops that name's supervisor
    lifecycles: DashMap<String, CancellationToken>,
}

impl ManagerInner {
    /// Drop everything held for `name`, but only if `session` is still the live one
    fn forget(&self, name: &str, session: &Arc<ServerSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(name, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            self.breakers.remove(name);
            self.cache.invalidate(name);
            if let Some((_, token)) = self.lifecycles.remove(name) {
                token.cancel();
            }
        }
        removed
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for entry in self.lifecycles.iter() {
            entry.value().cancel();
        }
        self.breakers.stop_monitor();
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cheap-to-clone handle; clones share the same sessions and breakers.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionManagerConfig,
        breaker_config: CircuitBreakerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let breakers = Arc::new(CircuitBreakerManager::new(breaker_config, events.clone()));
        breakers.start_monitor();

        Self {
            inner: Arc::new(ManagerInner {
                cache: ToolCache::new(
                    Duration::from_millis(config.tool_cache_ttl_ms),
                    config.enable_tool_caching,
                ),
                config,
                sessions: DashMap::new(),
                breakers,
                middleware: RwLock::new(Vec::new()),
                events,
                factory,
                in_flight: AtomicUsize::new(0),
                sequence: AtomicU64::new(0),
                lifecycles: DashMap::new(),
            }),
        }
    }

    /// Manager over stdio/TCP transports, configured from a loaded config file
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.manager.clone(),
            config.circuit_breaker.clone(),
            Arc::new(DefaultTransportFactory::new()),
        )
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.inner.breakers
    }

    pub fn use_middleware(&self, middleware: Arc<dyn ToolMiddleware>) {
        debug!("Registering tool middleware '{}'", middleware.name());
        self.inner.middleware.write().push(middleware);
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    // ---- connection lifecycle ----

    pub async fn connect(&self, config: ServerConnectionConfig) -> GatewayResult<()> {
        let name = config.name.clone();
        let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(ServerSession::new(config, seq));

        match self.inner.sessions.entry(name.clone()) {
            Entry::Occupied(_) => return Err(GatewayError::DuplicateConnection(name)),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        info!(
            "Connecting to server '{}' via {}",
            name,
            session.config().transport.kind()
        );
        let timeout = self.timeout_for(None, session.config().timeout_ms);
        if let Err(e) = session.open(self.inner.factory.as_ref(), timeout).await {
            self.inner
                .sessions
                .remove_if(&name, |_, current| Arc::ptr_eq(current, &session));
            self.inner.events.emit(GatewayEvent::Error {
                server: Some(name.clone()),
                message: e.to_string(),
            });
            return Err(match e {
                e @ GatewayError::Connection { .. } => e,
                other => GatewayError::connection(&name, other),
            });
        }

        let still_registered = self
            .inner
            .sessions
            .get(&name)
            .map_or(false, |current| Arc::ptr_eq(current.value(), &session));
        if !still_registered {
            warn!("Server '{}' was disconnected during its handshake", name);
            session.close().await;
            return Err(GatewayError::connection(&name, "disconnected during handshake"));
        }

        let token = CancellationToken::new();
        if let Some(stale) = self.inner.lifecycles.insert(name.clone(), token.clone()) {
            stale.cancel();
        }
        tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            session.clone(),
            token,
        ));

        self.activate(&session).await;
        Ok(())
    }

    /// Connect several servers concurrently, reporting each outcome
    pub async fn connect_all(
        &self,
        configs: Vec<ServerConnectionConfig>,
    ) -> Vec<(String, GatewayResult<()>)> {
        join_all(configs.into_iter().map(|config| async move {
            let name = config.name.clone();
            (name, self.connect(config).await)
        }))
        .await
    }

    pub async fn disconnect(&self, name: &str) -> GatewayResult<()> {
        let (_, session) = self
            .inner
            .sessions
            .remove(name)
            .ok_or_else(|| GatewayError::connection(name, "not connected"))?;

        if let Some((_, token)) = self.inner.lifecycles.remove(name) {
            token.cancel();
        }
        session.close().await;
        self.inner.breakers.remove(name);
        self.inner.cache.invalidate(name);

        info!("Disconnected from server '{}'", name);
        self.inner.events.emit(GatewayEvent::ServerDisconnected {
            server: name.to_string(),
            reason: "requested".to_string(),
        });
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        let names = self.list_servers();
        let results = join_all(names.iter().map(|name| self.disconnect(name))).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                debug!("Disconnect of '{}' skipped: {}", name, e);
            }
        }
    }

    /// Post-handshake bookkeeping shared by connect and reconnect
    async fn activate(&self, session: &Arc<ServerSession>) {
        let name = session.name().to_string();
        self.inner.breakers.register(&name);
        self.inner.cache.invalidate(&name);

        info!("Connected to server '{}'", name);
        self.inner.events.emit(GatewayEvent::ServerConnected {
            server: name.clone(),
        });

        if self.inner.config.auto_discover_tools {
            if let Err(e) = self.discover_tools(&name).await {
                warn!("Tool discovery failed for '{}': {}", name, e);
            }
            if let Err(e) = self.discover_resources(&name).await {
                debug!("Resource discovery failed for '{}': {}", name, e);
            }
        }
    }

    // ---- discovery ----

    pub async fn discover_tools(&self, name: &str) -> GatewayResult<Vec<ToolDescriptor>> {
        let session = self.connected_session(name)?;

        if let Some(tools) = self.inner.cache.get(name) {
            debug!("Using cached tools for '{}' ({} tools)", name, tools.len());
            return Ok(tools);
        }

        let client = session.client()?;
        let timeout = self.timeout_for(None, session.config().timeout_ms);
        let listed = match tokio::time::timeout(timeout, client.list_tools()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
        };
        let definitions = match listed {
            Ok(definitions) => definitions,
            Err(e) => return Err(self.discovery_failed(&session, e)),
        };

        session.replace_tools(
            definitions
                .into_iter()
                .map(|d| ToolDescriptor::from_definition(name, d))
                .collect(),
        );
        let tools = session.tools();
        self.inner.cache.insert(name, tools.clone());

        info!("Discovered {} tools from '{}'", tools.len(), name);
        self.inner.events.emit(GatewayEvent::ToolsDiscovered {
            server: name.to_string(),
            count: tools.len(),
        });
        Ok(tools)
    }

    /// Discover across every connected server; a failing server yields an empty list.
    pub async fn discover_all_tools(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        let names = self.connected_servers();
        let results = join_all(names.iter().map(|name| self.discover_tools(name))).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| match result {
                Ok(tools) => (name, tools),
                Err(e) => {
                    warn!("Tool discovery failed for '{}': {}", name, e);
                    (name, Vec::new())
                }
            })
            .collect()
    }

    pub async fn discover_resources(&self, name: &str) -> GatewayResult<Vec<ResourceDescriptor>> {
        let session = self.connected_session(name)?;
        let client = session.client()?;
        let timeout = self.timeout_for(None, session.config().timeout_ms);

        let listed = match tokio::time::timeout(timeout, client.list_resources()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
        };
        let definitions = match listed {
            Ok(definitions) => definitions,
            Err(e) => return Err(self.discovery_failed(&session, e)),
        };

        session.replace_resources(
            definitions
                .into_iter()
                .map(|d| ResourceDescriptor::from_definition(name, d))
                .collect(),
        );
        let resources = session.resources();

        debug!("Discovered {} resources from '{}'", resources.len(), name);
        self.inner.events.emit(GatewayEvent::ResourcesDiscovered {
            server: name.to_string(),
            count: resources.len(),
        });
        Ok(resources)
    }

    pub async fn discover_all_resources(&self) -> HashMap<String, Vec<ResourceDescriptor>> {
        let names = self.connected_servers();
        let results = join_all(names.iter().map(|name| self.discover_resources(name))).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| (name, result.unwrap_or_default()))
            .collect()
    }

    fn discovery_failed(&self, session: &ServerSession, error: GatewayError) -> GatewayError {
        session.record_error();
        self.inner.events.emit(GatewayEvent::Error {
            server: Some(session.name().to_string()),
            message: error.to_string(),
        });
        error
    }

    // ---- execution ----

    pub async fn execute_tool(
        &self,
        request: ToolExecutionRequest,
    ) -> GatewayResult<ToolExecutionResponse> {
        let _slot = match self.admit() {
            Ok(slot) => slot,
            Err(e) => {
                warn!("Rejected '{}': {}", request.tool_name, e);
                self.inner.events.emit(GatewayEvent::Error {
                    server: request.server_name.clone(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let tool_name = request.tool_name.as_str();
        let session = match self.resolve_tool_server(request.server_name.as_deref(), tool_name) {
            Ok(session) => session,
            Err(e) => {
                let tool = ToolDescriptor::unresolved(request.server_name.as_deref(), tool_name);
                return Err(self.execution_failed(None, &tool, e, false, Instant::now()).await);
            }
        };
        let server = session.name().to_string();
        let tool = session
            .tool(tool_name)
            .unwrap_or_else(|| ToolDescriptor::unresolved(Some(&server), tool_name));

        if !self.inner.breakers.should_allow_request(&server) {
            let state = self
                .inner
                .breakers
                .state(&server)
                .unwrap_or(CircuitState::Open);
            let e = GatewayError::CircuitOpen {
                server: server.clone(),
                state,
            };
            return Err(self.execution_failed(Some(&session), &tool, e, false, Instant::now()).await);
        }

        let mut arguments = request.arguments.clone();
        for middleware in self.middleware_chain() {
            arguments = match middleware.before_execute(&tool, arguments).await {
                Ok(arguments) => arguments,
                Err(e) => {
                    return Err(self
                        .execution_failed(Some(&session), &tool, e, false, Instant::now())
                        .await)
                }
            };
        }

        let client = match session.client() {
            Ok(client) => client,
            Err(e) => {
                return Err(self
                    .execution_failed(Some(&session), &tool, e, false, Instant::now())
                    .await)
            }
        };

        let timeout = self.timeout_for(request.timeout_ms, session.config().timeout_ms);
        let started = Instant::now();
        session.record_tool_call();
        let outcome = match tokio::time::timeout(timeout, client.call_tool(tool_name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => return Err(self.execution_failed(Some(&session), &tool, e, true, started).await),
        };

        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        let descriptor = session
            .update_tool(tool_name, |t| t.record_success(elapsed.as_secs_f64() * 1000.0))
            .unwrap_or(tool);
        self.inner.breakers.record_success(&server);

        let response = ToolExecutionResponse {
            success: true,
            result: Some(result),
            error: None,
            duration_ms,
            server_name: server.clone(),
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
        };

        for middleware in self.middleware_chain() {
            middleware.after_execute(&descriptor, &response).await;
        }

        self.inner.events.emit(GatewayEvent::ToolExecuted {
            server: Some(server),
            tool: tool_name.to_string(),
            success: true,
            duration_ms,
            error: None,
        });
        Ok(response)
    }

    /// Record, report and hand back a failed execution. The breaker only
    /// counts calls that actually reached the server.
    async fn execution_failed(
        &self,
        session: Option<&Arc<ServerSession>>,
        tool: &ToolDescriptor,
        error: GatewayError,
        dispatched: bool,
        started: Instant,
    ) -> GatewayError {
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(session) = session {
            session.record_error();
            session.update_tool(&tool.name, |t| t.record_failure());
            if dispatched {
                self.inner
                    .breakers
                    .record_failure(session.name(), &error.to_string());
            }
        }

        for middleware in self.middleware_chain() {
            middleware.on_error(tool, &error).await;
        }

        debug!("Tool '{}' failed: {}", tool.name, error);
        self.inner.events.emit(GatewayEvent::ToolExecuted {
            server: session
                .map(|s| s.name().to_string())
                .or_else(|| (!tool.server_name.is_empty()).then(|| tool.server_name.clone())),
            tool: tool.name.clone(),
            success: false,
            duration_ms,
            error: Some(error.to_string()),
        });
        error
    }

    /// Resource reads share tool routing and the timeout race but skip the
    /// breaker and the concurrency cap.
    pub async fn read_resource(
        &self,
        request: ResourceReadRequest,
    ) -> GatewayResult<ResourceReadResponse> {
        let session = match &request.server_name {
            Some(name) => self.connected_session(name),
            None => self.resolve_resource_server(&request.uri).await,
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => return Err(self.read_failed(None, request.server_name.clone(), &request.uri, e)),
        };

        let client = match session.client() {
            Ok(client) => client,
            Err(e) => return Err(self.read_failed(Some(&session), None, &request.uri, e)),
        };
        let timeout = self.timeout_for(request.timeout_ms, session.config().timeout_ms);
        let outcome = match tokio::time::timeout(timeout, client.read_resource(&request.uri)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(contents) => {
                session.record_resource_read();
                self.inner.events.emit(GatewayEvent::ResourceRead {
                    server: Some(session.name().to_string()),
                    uri: request.uri.clone(),
                    success: true,
                    error: None,
                });
                Ok(ResourceReadResponse {
                    success: true,
                    contents: Some(contents),
                    error: None,
                    server_name: session.name().to_string(),
                    uri: request.uri,
                    timestamp: Utc::now(),
                })
            }
            Err(e) => Err(self.read_failed(Some(&session), None, &request.uri, e)),
        }
    }

    fn read_failed(
        &self,
        session: Option<&Arc<ServerSession>>,
        requested: Option<String>,
        uri: &str,
        error: GatewayError,
    ) -> GatewayError {
        if let Some(session) = session {
            session.record_error();
        }
        debug!("Resource '{}' read failed: {}", uri, error);
        self.inner.events.emit(GatewayEvent::ResourceRead {
            server: session.map(|s| s.name().to_string()).or(requested),
            uri: uri.to_string(),
            success: false,
            error: Some(error.to_string()),
        });
        error
    }

    fn admit(&self) -> GatewayResult<InFlightGuard<'_>> {
        let max = self.inner.config.max_concurrent_executions;
        self.inner
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .map(|_| InFlightGuard {
                counter: &self.inner.in_flight,
            })
            .map_err(|_| GatewayError::ConcurrencyLimit(max))
    }

    fn resolve_tool_server(
        &self,
        server: Option<&str>,
        tool: &str,
    ) -> GatewayResult<Arc<ServerSession>> {
        match server {
            Some(name) => self.connected_session(name),
            None => self
                .sessions_in_order()
                .into_iter()
                .find(|s| s.is_connected() && s.has_tool(tool))
                .ok_or_else(|| GatewayError::ToolNotFound(tool.to_string())),
        }
    }

    async fn resolve_resource_server(&self, uri: &str) -> GatewayResult<Arc<ServerSession>> {
        let candidates: Vec<_> = self
            .sessions_in_order()
            .into_iter()
            .filter(|s| s.is_connected())
            .collect();

        if let Some(session) = candidates.iter().find(|s| s.has_resource(uri)) {
            return Ok(session.clone());
        }

        for session in candidates {
            match self.discover_resources(session.name()).await {
                Ok(resources) if resources.iter().any(|r| r.uri == uri) => return Ok(session),
                Ok(_) => {}
                Err(e) => debug!("Skipping '{}' while resolving {}: {}", session.name(), uri, e),
            }
        }

        Err(GatewayError::ResourceNotFound(uri.to_string()))
    }

    fn connected_session(&self, name: &str) -> GatewayResult<Arc<ServerSession>> {
        let session = self
            .inner
            .sessions
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| GatewayError::connection(name, "not connected"))?;

        match session.status() {
            SessionStatus::Connected => Ok(session),
            status => Err(GatewayError::connection(name, format!("server is {}", status))),
        }
    }

    fn timeout_for(&self, request: Option<u64>, server: Option<u64>) -> Duration {
        Duration::from_millis(
            request
                .or(server)
                .unwrap_or(self.inner.config.default_timeout_ms),
        )
    }

    fn middleware_chain(&self) -> Vec<Arc<dyn ToolMiddleware>> {
        self.inner.middleware.read().clone()
    }

    fn sessions_in_order(&self) -> Vec<Arc<ServerSession>> {
        let mut sessions: Vec<_> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.seq());
        sessions
    }

    fn connected_servers(&self) -> Vec<String> {
        self.sessions_in_order()
            .into_iter()
            .filter(|s| s.is_connected())
            .map(|s| s.name().to_string())
            .collect()
    }

    // ---- inspection ----

    /// Registered server names in connection order
    pub fn list_servers(&self) -> Vec<String> {
        self.sessions_in_order()
            .into_iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn server_status(&self, name: &str) -> Option<ServerStatus> {
        let session = self.inner.sessions.get(name).map(|s| s.clone())?;
        Some(self.status_of(&session))
    }

    pub fn all_server_status(&self) -> Vec<ServerStatus> {
        self.sessions_in_order()
            .iter()
            .map(|s| self.status_of(s))
            .collect()
    }

    fn status_of(&self, session: &ServerSession) -> ServerStatus {
        ServerStatus {
            name: session.name().to_string(),
            status: session.status(),
            transport: session.config().transport.kind().to_string(),
            tool_count: session.tool_count(),
            resource_count: session.resource_count(),
            circuit: self.inner.breakers.state(session.name()),
            stats: session.stats(),
        }
    }

    /// Known tools of one server, or of every connected server
    pub fn tools(&self, server: Option<&str>) -> Vec<ToolDescriptor> {
        match server {
            Some(name) => self
                .inner
                .sessions
                .get(name)
                .map(|s| s.tools())
                .unwrap_or_default(),
            None => self
                .sessions_in_order()
                .into_iter()
                .filter(|s| s.is_connected())
                .flat_map(|s| s.tools())
                .collect(),
        }
    }

    pub fn resources(&self, server: Option<&str>) -> Vec<ResourceDescriptor> {
        match server {
            Some(name) => self
                .inner
                .sessions
                .get(name)
                .map(|s| s.resources())
                .unwrap_or_default(),
            None => self
                .sessions_in_order()
                .into_iter()
                .filter(|s| s.is_connected())
                .flat_map(|s| s.resources())
                .collect(),
        }
    }

    pub fn tool(&self, server: &str, name: &str) -> Option<ToolDescriptor> {
        self.inner.sessions.get(server).and_then(|s| s.tool(name))
    }

    pub fn clear_cache(&self, server: Option<&str>) {
        match server {
            Some(name) => {
                self.inner.cache.invalidate(name);
            }
            None => self.inner.cache.clear(),
        }
    }

    pub fn get_stats(&self) -> ManagerStats {
        let mut stats = ManagerStats {
            total_servers: self.inner.sessions.len(),
            in_flight: self.in_flight(),
            ..Default::default()
        };

        for entry in self.inner.sessions.iter() {
            let session = entry.value();
            if !session.is_connected() {
                continue;
            }
            let session_stats = session.stats();
            stats.connected_servers += 1;
            stats.total_tools += session.tool_count();
            stats.total_resources += session.resource_count();
            stats.total_tool_calls += session_stats.total_tool_calls;
            stats.total_resource_reads += session_stats.total_resource_reads;
            stats.total_errors += session_stats.errors;
        }

        stats
    }
}

/// Watch one server name for unexpected transport closes and run the
/// reconnect policy. Holds only a weak reference between steps so a dropped
/// manager is never kept alive by its supervisors.
async fn supervise(
    manager: Weak<ManagerInner>,
    mut session: Arc<ServerSession>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = session.closed() => {}
        }
        if token.is_cancelled() {
            return;
        }

        match recover(&manager, &session, &token).await {
            Some(next) => session = next,
            None => return,
        }
    }
}

async fn recover(
    manager: &Weak<ManagerInner>,
    lost: &Arc<ServerSession>,
    token: &CancellationToken,
) -> Option<Arc<ServerSession>> {
    let config = lost.config().clone();
    let name = config.name.clone();

    {
        let inner = manager.upgrade()?;
        lost.set_status(SessionStatus::Disconnected);
        warn!("Server '{}' disconnected unexpectedly", name);
        inner.events.emit(GatewayEvent::ServerDisconnected {
            server: name.clone(),
            reason: "transport closed".to_string(),
        });

        if !config.auto_reconnect {
            inner.forget(&name, lost);
            return None;
        }
    }

    let max_attempts = config.max_reconnect_attempts;
    for attempt in 1..=max_attempts {
        if token.is_cancelled() {
            return None;
        }
        let handle = ConnectionManager {
            inner: manager.upgrade()?,
        };

        lost.record_reconnect_attempt();
        info!(
            "Reconnecting to '{}' (attempt {}/{})",
            name, attempt, max_attempts
        );
        handle.inner.events.emit(GatewayEvent::ServerReconnecting {
            server: name.clone(),
            attempt,
            max_attempts,
        });

        // Every attempt starts from a fresh session; a failed one is simply dropped.
        let candidate = Arc::new(ServerSession::new(config.clone(), lost.seq()));
        candidate.inherit_stats(lost);
        let timeout = handle.timeout_for(None, config.timeout_ms);

        match candidate.open(handle.inner.factory.as_ref(), timeout).await {
            Ok(()) => {
                let swapped = !token.is_cancelled()
                    && match handle.inner.sessions.get_mut(&name) {
                        Some(mut current) if Arc::ptr_eq(current.value(), lost) => {
                            *current = candidate.clone();
                            true
                        }
                        _ => false,
                    };

                if !swapped {
                    candidate.close().await;
                    return None;
                }

                info!("Reconnected to '{}' on attempt {}", name, attempt);
                handle.activate(&candidate).await;
                return Some(candidate);
            }
            Err(e) => {
                warn!("Reconnect attempt {} for '{}' failed: {}", attempt, name, e);
            }
        }

        drop(handle);
        if attempt < max_attempts {
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(config.reconnect_delay()) => {}
            }
        }
    }

    let inner = manager.upgrade()?;
    error!(
        "Giving up on '{}' after {} reconnect attempts",
        name, max_attempts
    );
    inner.forget(&name, lost);
    inner.events.emit(GatewayEvent::Error {
        server: Some(name.clone()),
        message: format!("reconnect failed after {} attempts", max_attempts),
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_manager_config_defaults() {
        let config = ConnectionManagerConfig::default();
        assert_eq!(config.default_timeout_ms, 30_000);
        assert!(config.enable_tool_caching);
        assert_eq!(config.tool_cache_ttl_ms, 300_000);
        assert!(config.auto_discover_tools);
        assert_eq!(config.max_concurrent_executions, 10);
    }

    #[test]
    fn test_manager_config_rejects_zero_concurrency() {
        let config = ConnectionManagerConfig {
            max_concurrent_executions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_admission_guard_releases_slot() {
        let manager = ConnectionManager::new(
            ConnectionManagerConfig {
                max_concurrent_executions: 1,
                ..Default::default()
            },
            CircuitBreakerConfig::default(),
            Arc::new(DefaultTransportFactory::new()),
        );

        let slot = manager.admit().unwrap();
        assert_eq!(manager.in_flight(), 1);
        assert!(matches!(
            manager.admit(),
            Err(GatewayError::ConcurrencyLimit(1))
        ));
        drop(slot);
        assert_eq!(manager.in_flight(), 0);
        assert!(manager.admit().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_server_is_connection_error() {
        let manager = ConnectionManager::new(
            ConnectionManagerConfig::default(),
            CircuitBreakerConfig::default(),
            Arc::new(DefaultTransportFactory::new()),
        );

        let err = manager
            .execute_tool(ToolExecutionRequest::new("echo", Value::Null).on_server("ghost"))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(manager.in_flight(), 0);

        let err = manager
            .execute_tool(ToolExecutionRequest::new("echo", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ToolNotFound(_)));
    }
}
