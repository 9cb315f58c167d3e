//! Translation between message envelopes and connection manager calls

pub mod envelope;

pub use envelope::{MessageEnvelope, MessagePayload};

use crate::core::manager::ConnectionManager;
use crate::core::types::{
    ResourceReadRequest, ResourceReadResponse, ToolExecutionRequest, ToolExecutionResponse,
};
use crate::utils::errors::{GatewayError, GatewayResult};
use chrono::Utc;
use tracing::debug;

/// Converts envelopes into manager requests and results back into replies.
/// Failed calls become `success: false` payloads rather than errors.
#[derive(Debug, Clone)]
pub struct ProtocolAdapter {
    agent_id: String,
}

impl ProtocolAdapter {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn tool_call(&self, to: impl Into<String>, request: ToolExecutionRequest) -> MessageEnvelope {
        MessageEnvelope::new(&self.agent_id, to, MessagePayload::ToolCall(request))
    }

    pub fn resource_read(&self, to: impl Into<String>, request: ResourceReadRequest) -> MessageEnvelope {
        MessageEnvelope::new(&self.agent_id, to, MessagePayload::ResourceRead(request))
    }

    pub fn to_tool_request(&self, envelope: &MessageEnvelope) -> GatewayResult<ToolExecutionRequest> {
        match &envelope.payload {
            MessagePayload::ToolCall(request) => Ok(request.clone()),
            other => Err(unexpected_payload("tool_call", other)),
        }
    }

    pub fn to_resource_request(&self, envelope: &MessageEnvelope) -> GatewayResult<ResourceReadRequest> {
        match &envelope.payload {
            MessagePayload::ResourceRead(request) => Ok(request.clone()),
            other => Err(unexpected_payload("resource_read", other)),
        }
    }

    pub fn tool_result(
        &self,
        request_envelope: &MessageEnvelope,
        request: &ToolExecutionRequest,
        result: GatewayResult<ToolExecutionResponse>,
    ) -> MessageEnvelope {
        let response = result.unwrap_or_else(|e| ToolExecutionResponse {
            success: false,
            result: None,
            error: Some(e.to_string()),
            duration_ms: 0,
            server_name: request.server_name.clone().unwrap_or_default(),
            tool_name: request.tool_name.clone(),
            timestamp: Utc::now(),
        });
        self.reply(request_envelope, MessagePayload::ToolResult(response))
    }

    pub fn resource_result(
        &self,
        request_envelope: &MessageEnvelope,
        request: &ResourceReadRequest,
        result: GatewayResult<ResourceReadResponse>,
    ) -> MessageEnvelope {
        let response = result.unwrap_or_else(|e| ResourceReadResponse {
            success: false,
            contents: None,
            error: Some(e.to_string()),
            server_name: request.server_name.clone().unwrap_or_default(),
            uri: request.uri.clone(),
            timestamp: Utc::now(),
        });
        self.reply(request_envelope, MessagePayload::ResourceContents(response))
    }

    /// Serve one inbound envelope against the manager and build the reply
    pub async fn handle(
        &self,
        manager: &ConnectionManager,
        envelope: MessageEnvelope,
    ) -> GatewayResult<MessageEnvelope> {
        debug!(
            "Handling '{}' envelope {} from {}",
            envelope.payload.kind(),
            envelope.id,
            envelope.from
        );

        match &envelope.payload {
            MessagePayload::ToolCall(request) => {
                let result = manager.execute_tool(request.clone()).await;
                Ok(self.tool_result(&envelope, request, result))
            }
            MessagePayload::ResourceRead(request) => {
                let result = manager.read_resource(request.clone()).await;
                Ok(self.resource_result(&envelope, request, result))
            }
            other => Err(GatewayError::Validation(format!(
                "cannot handle '{}' payload",
                other.kind()
            ))),
        }
    }

    fn reply(&self, request_envelope: &MessageEnvelope, payload: MessagePayload) -> MessageEnvelope {
        MessageEnvelope::new(&self.agent_id, request_envelope.from.clone(), payload)
            .with_correlation_id(request_envelope.id.clone())
    }
}

fn unexpected_payload(expected: &str, actual: &MessagePayload) -> GatewayError {
    GatewayError::Validation(format!(
        "expected '{}' payload, got '{}'",
        expected,
        actual.kind()
    ))
}
