use crate::core::circuit_breaker::CircuitState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("connection error for '{server}': {message}")]
    Connection { server: String, message: String },

    #[error("server '{0}' is already connected")]
    DuplicateConnection(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("circuit breaker for '{server}' is {state}")]
    CircuitOpen { server: String, state: CircuitState },

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("concurrency limit reached: {0} executions already in flight")]
    ConcurrencyLimit(usize),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("subsystem unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn connection(server: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connection {
            server: server.into(),
            message: message.to_string(),
        }
    }

    /// True for failures to establish or keep a server session.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::DuplicateConnection(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::DuplicateConnection(_) => "CONNECTION_ERROR",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConcurrencyLimit(_) => "CONCURRENCY_LIMIT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Rpc { .. } => "RPC_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Collaborator(_) => "COLLABORATOR_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
