use crate::core::types::{
    ResourceReadRequest, ResourceReadResponse, ToolExecutionRequest, ToolExecutionResponse,
};
use crate::orchestrator::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed body of an inter-component message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    ToolCall(ToolExecutionRequest),
    ToolResult(ToolExecutionResponse),
    ResourceRead(ResourceReadRequest),
    ResourceContents(ResourceReadResponse),
    Text { content: String },
    Task(Task),
}

impl MessagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::ToolCall(_) => "tool_call",
            MessagePayload::ToolResult(_) => "tool_result",
            MessagePayload::ResourceRead(_) => "resource_read",
            MessagePayload::ResourceContents(_) => "resource_contents",
            MessagePayload::Text { .. } => "text",
            MessagePayload::Task(_) => "task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    /// Id of the envelope this one answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload: MessagePayload,
}

impl MessageEnvelope {
    pub fn new(from: impl Into<String>, to: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Answer addressed back to the sender, correlated by this envelope's id
    pub fn reply(&self, payload: MessagePayload) -> Self {
        Self::new(self.to.clone(), self.from.clone(), payload).with_correlation_id(self.id.clone())
    }
}
