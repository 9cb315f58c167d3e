//! Observer channel for connection, discovery, execution and breaker events
//!
//! Emission never blocks: events go onto a broadcast channel and are dropped
//! when nobody is listening or a slow subscriber lags behind.

use crate::core::circuit_breaker::CircuitState;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Generic name shared by every breaker transition
pub const STATE_CHANGED: &str = "state:changed";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    ServerConnected {
        server: String,
    },
    ServerDisconnected {
        server: String,
        reason: String,
    },
    ServerReconnecting {
        server: String,
        attempt: u32,
        max_attempts: u32,
    },
    ToolsDiscovered {
        server: String,
        count: usize,
    },
    ResourcesDiscovered {
        server: String,
        count: usize,
    },
    ToolExecuted {
        server: Option<String>,
        tool: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    ResourceRead {
        server: Option<String>,
        uri: String,
        success: bool,
        error: Option<String>,
    },
    CircuitStateChanged {
        server: String,
        from: CircuitState,
        to: CircuitState,
        reason: Option<String>,
    },
    Error {
        server: Option<String>,
        message: String,
    },
}

impl GatewayEvent {
    /// Wire name of the event, e.g. `tool:executed`
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::ServerConnected { .. } => "server:connected",
            GatewayEvent::ServerDisconnected { .. } => "server:disconnected",
            GatewayEvent::ServerReconnecting { .. } => "server:reconnecting",
            GatewayEvent::ToolsDiscovered { .. } => "tools:discovered",
            GatewayEvent::ResourcesDiscovered { .. } => "resources:discovered",
            GatewayEvent::ToolExecuted { .. } => "tool:executed",
            GatewayEvent::ResourceRead { .. } => "resource:read",
            GatewayEvent::CircuitStateChanged { to, .. } => match to {
                CircuitState::Open => "circuit:open",
                CircuitState::Closed => "circuit:close",
                CircuitState::HalfOpen => "circuit:half-open",
            },
            GatewayEvent::Error { .. } => "error",
        }
    }

    /// Every wire name the event answers to. Breaker transitions carry both
    /// their named `circuit:*` form and the generic `state:changed`.
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            GatewayEvent::CircuitStateChanged { .. } => vec![self.name(), STATE_CHANGED],
            _ => vec![self.name()],
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.names().contains(&name)
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            GatewayEvent::ServerConnected { server }
            | GatewayEvent::ServerDisconnected { server, .. }
            | GatewayEvent::ServerReconnecting { server, .. }
            | GatewayEvent::ToolsDiscovered { server, .. }
            | GatewayEvent::ResourcesDiscovered { server, .. }
            | GatewayEvent::CircuitStateChanged { server, .. } => Some(server),
            GatewayEvent::ToolExecuted { server, .. }
            | GatewayEvent::ResourceRead { server, .. }
            | GatewayEvent::Error { server, .. } => server.as_deref(),
        }
    }
}

/// Broadcast event bus shared by the connection manager and the breakers
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GatewayEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: GatewayEvent) {
        let receivers = self.sender.receiver_count();
        if receivers > 0 {
            debug!("Emitting '{}' to {} receivers", event.name(), receivers);
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
