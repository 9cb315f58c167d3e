pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod events;
pub mod manager;
pub mod middleware;
pub mod protocol;
pub mod session;
pub mod types;

pub use cache::{ToolCache, ToolCacheEntry};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitSnapshot, CircuitState,
};
pub use client::McpClient;
pub use events::{EventBus, GatewayEvent, STATE_CHANGED};
pub use manager::{ConnectionManager, ConnectionManagerConfig};
pub use middleware::{LoggingMiddleware, ToolMiddleware};
pub use session::{
    ExecutionStatus, ResourceDescriptor, ServerSession, SessionStats, SessionStatus, ToolDescriptor,
};
pub use types::{
    ManagerStats, ResourceReadRequest, ResourceReadResponse, ServerStatus, ToolExecutionRequest,
    ToolExecutionResponse,
};
