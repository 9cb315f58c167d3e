//! Seams to the subsystems the router delegates to

use crate::adapter::MessageEnvelope;
use crate::orchestrator::workflow::WorkflowGraph;
use crate::utils::errors::GatewayResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runs workflow graphs
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute(&self, graph: WorkflowGraph) -> GatewayResult<Value>;
}

/// Delivers envelopes to other agents
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn send(&self, envelope: MessageEnvelope) -> GatewayResult<Value>;
}

/// Capability-indexed agent lookup
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Agents advertising exactly this capability
    async fn find_by_capability(&self, capability: &str) -> GatewayResult<Vec<AgentInfo>>;

    /// Broader, fuzzy lookup used when the exact match comes back empty
    async fn discover(&self, query: &str) -> GatewayResult<Vec<AgentInfo>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: None,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            description: None,
        }
    }

    fn matches_loosely(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.capabilities
            .iter()
            .any(|c| c.to_lowercase().contains(&query))
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&query))
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
    }
}

/// Directory backed by a plain list, seeded from configuration
#[derive(Debug, Default)]
pub struct InMemoryAgentDirectory {
    agents: RwLock<Vec<AgentInfo>>,
}

impl InMemoryAgentDirectory {
    pub fn new(agents: Vec<AgentInfo>) -> Self {
        Self {
            agents: RwLock::new(agents),
        }
    }

    /// Insert or replace by id
    pub fn register(&self, agent: AgentInfo) {
        let mut agents = self.agents.write();
        agents.retain(|a| a.id != agent.id);
        agents.push(agent);
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut agents = self.agents.write();
        let before = agents.len();
        agents.retain(|a| a.id != id);
        agents.len() != before
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn find_by_capability(&self, capability: &str) -> GatewayResult<Vec<AgentInfo>> {
        Ok(self
            .agents
            .read()
            .iter()
            .filter(|a| a.capabilities.iter().any(|c| c == capability))
            .cloned()
            .collect())
    }

    async fn discover(&self, query: &str) -> GatewayResult<Vec<AgentInfo>> {
        Ok(self
            .agents
            .read()
            .iter()
            .filter(|a| a.matches_loosely(query))
            .cloned()
            .collect())
    }
}
