//! agentlink: tool-server gateway and task router for multi-agent systems

pub mod adapter;
pub mod cli;
pub mod config;
pub mod core;
pub mod orchestrator;
pub mod transport;
pub mod utils;

pub use adapter::{MessageEnvelope, MessagePayload, ProtocolAdapter};
pub use config::Config;
pub use core::{CircuitBreakerManager, ConnectionManager, GatewayEvent};
pub use orchestrator::{Task, TaskRouter};
pub use utils::errors::{GatewayError, GatewayResult};
