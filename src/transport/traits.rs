use crate::config::ServerConnectionConfig;
use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::utils::errors::GatewayResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Bidirectional request/response channel to one tool server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for response
    async fn send_request(&self, request: JsonRpcRequest) -> GatewayResult<JsonRpcResponse>;

    /// Send a notification (no response expected)
    async fn send_notification(&self, request: JsonRpcRequest) -> GatewayResult<()>;

    /// Check if transport is connected
    async fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&self) -> GatewayResult<()>;

    /// Resolves once the channel is down, whichever side closed it.
    async fn closed(&self);
}

/// Opens transports for server configs; the connection manager only sees this seam.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, config: &ServerConnectionConfig) -> GatewayResult<Arc<dyn Transport>>;
}
