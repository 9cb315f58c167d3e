use crate::config::{ServerConnectionConfig, TransportConfig};
use crate::transport::line::LineTransport;
use crate::transport::traits::{Transport, TransportFactory};
use crate::utils::errors::GatewayResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Opens stdio and TCP transports from server configs
#[derive(Debug, Default, Clone)]
pub struct DefaultTransportFactory;

impl DefaultTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn connect(&self, config: &ServerConnectionConfig) -> GatewayResult<Arc<dyn Transport>> {
        let transport = match &config.transport {
            TransportConfig::Stdio { command, args, env } => {
                info!("Opening stdio transport for '{}'", config.name);
                LineTransport::spawn_process(config.name.clone(), command, args, env).await?
            }
            TransportConfig::Tcp { address } => {
                info!("Opening tcp transport for '{}' at {}", config.name, address);
                LineTransport::connect_tcp(config.name.clone(), address).await?
            }
        };
        Ok(Arc::new(transport))
    }
}
