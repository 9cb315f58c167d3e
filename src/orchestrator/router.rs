//! Task router: classify a task and hand it to the right subsystem
//!
//! Dispatch order (first match wins): workflow (explicit type or more than one
//! step), communication, tool, then analysis of `simple` tasks. For analyzed
//! tasks a tool requirement beats messaging, messaging beats reasoning, and
//! anything unresolved falls back to the workflow engine.

use crate::adapter::{MessageEnvelope, MessagePayload};
use crate::core::manager::ConnectionManager;
use crate::core::types::{ToolExecutionRequest, ToolExecutionResponse};
use crate::orchestrator::analysis::{TaskAnalysis, TaskAnalyzer};
use crate::orchestrator::collaborators::{AgentDirectory, AgentInfo, MessageBus, WorkflowEngine};
use crate::orchestrator::config::RouterConfig;
use crate::orchestrator::task::{Task, TaskType};
use crate::orchestrator::workflow::WorkflowGraph;
use crate::utils::errors::{GatewayError, GatewayResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Routing decision for one task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Workflow {
        graph: WorkflowGraph,
    },
    Message {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        capability: Option<String>,
        payload: MessagePayload,
    },
    Tool {
        request: ToolExecutionRequest,
    },
}

impl Route {
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Workflow { .. } => "workflow",
            Route::Message { .. } => "message",
            Route::Tool { .. } => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    Workflow(Value),
    Message(Value),
    Tool(ToolExecutionResponse),
}

/// Which collaborators are wired in; descriptive only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatus {
    pub workflow_engine: bool,
    pub message_bus: bool,
    pub connection_manager: bool,
    pub agent_directory: bool,
}

pub struct TaskRouter {
    config: RouterConfig,
    analyzer: TaskAnalyzer,
    connections: Option<ConnectionManager>,
    messaging: Option<Arc<dyn MessageBus>>,
    workflows: Option<Arc<dyn WorkflowEngine>>,
    directory: Option<Arc<dyn AgentDirectory>>,
}

impl TaskRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            analyzer: TaskAnalyzer::new(config.clone()),
            config,
            connections: None,
            messaging: None,
            workflows: None,
            directory: None,
        }
    }

    pub fn with_connection_manager(mut self, manager: ConnectionManager) -> Self {
        self.connections = Some(manager);
        self
    }

    pub fn with_message_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.messaging = Some(bus);
        self
    }

    pub fn with_workflow_engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.workflows = Some(engine);
        self
    }

    pub fn with_agent_directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            workflow_engine: self.workflows.is_some(),
            message_bus: self.messaging.is_some(),
            connection_manager: self.connections.is_some(),
            agent_directory: self.directory.is_some(),
        }
    }

    pub fn analyze(&self, task: &Task) -> TaskAnalysis {
        self.analyzer.analyze(task)
    }

    /// Decide where a task goes without executing it
    pub async fn plan(&self, task: &Task) -> GatewayResult<Route> {
        if task.task_type == TaskType::Workflow || task.steps.len() > 1 {
            return Ok(Route::Workflow {
                graph: WorkflowGraph::from_task(task)?,
            });
        }

        match task.task_type {
            TaskType::Communication => {
                let target = task
                    .target
                    .clone()
                    .ok_or_else(|| GatewayError::Validation("target required".to_string()))?;
                Ok(Route::Message {
                    target,
                    capability: None,
                    payload: message_payload(task),
                })
            }
            TaskType::Tool => {
                let tool = task
                    .tool
                    .clone()
                    .ok_or_else(|| GatewayError::Validation("tool required".to_string()))?;
                Ok(Route::Tool {
                    request: ToolExecutionRequest {
                        server_name: task.server.clone(),
                        tool_name: tool,
                        arguments: task.args.clone().unwrap_or_else(|| json!({})),
                        timeout_ms: None,
                    },
                })
            }
            _ => self.plan_simple(task).await,
        }
    }

    async fn plan_simple(&self, task: &Task) -> GatewayResult<Route> {
        let analysis = self.analyzer.analyze(task);
        debug!(
            "Task {} analysis: reasoning={} tools={} communication={} confidence={:.2}",
            task.id,
            analysis.requires_reasoning,
            analysis.requires_tools,
            analysis.requires_communication,
            analysis.confidence
        );

        if analysis.requires_tools {
            if let Some(tool) = analysis.suggested_tool {
                return Ok(Route::Tool {
                    request: ToolExecutionRequest {
                        server_name: task.server.clone(),
                        tool_name: tool,
                        arguments: task
                            .args
                            .clone()
                            .unwrap_or_else(|| json!({ "input": task.input })),
                        timeout_ms: None,
                    },
                });
            }
        }

        let capability = if analysis.requires_communication {
            Some(
                analysis
                    .primary_capability
                    .unwrap_or_else(|| self.config.coordination_capability.clone()),
            )
        } else if analysis.requires_reasoning {
            Some(
                analysis
                    .primary_capability
                    .unwrap_or_else(|| self.config.reasoning_capability.clone()),
            )
        } else {
            analysis.primary_capability
        };

        if let Some(capability) = capability {
            if let Some(agent) = self.find_agent(&capability).await? {
                return Ok(Route::Message {
                    target: agent.id,
                    capability: Some(capability),
                    payload: MessagePayload::Task(task.clone()),
                });
            }
            debug!(
                "No agent offers '{}', falling back to workflow for task {}",
                capability, task.id
            );
        }

        Ok(Route::Workflow {
            graph: WorkflowGraph::from_task(task)?,
        })
    }

    async fn find_agent(&self, capability: &str) -> GatewayResult<Option<AgentInfo>> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };

        let exact = directory.find_by_capability(capability).await?;
        if let Some(agent) = exact.into_iter().next() {
            return Ok(Some(agent));
        }
        Ok(directory.discover(capability).await?.into_iter().next())
    }

    /// Plan and dispatch. Collaborator errors propagate unchanged; the
    /// router never retries.
    pub async fn execute(&self, task: Task) -> GatewayResult<TaskOutcome> {
        let route = self.plan(&task).await?;
        info!("Routing task {} ({}) to {}", task.id, task.task_type, route.kind());

        match route {
            Route::Workflow { graph } => {
                let engine = self
                    .workflows
                    .as_ref()
                    .ok_or_else(|| GatewayError::Unavailable("workflow engine".to_string()))?;
                Ok(TaskOutcome::Workflow(engine.execute(graph).await?))
            }
            Route::Message {
                target, payload, ..
            } => {
                let bus = self
                    .messaging
                    .as_ref()
                    .ok_or_else(|| GatewayError::Unavailable("message bus".to_string()))?;
                let envelope = MessageEnvelope::new(&self.config.sender_id, target, payload)
                    .with_correlation_id(task.id);
                Ok(TaskOutcome::Message(bus.send(envelope).await?))
            }
            Route::Tool { request } => {
                let manager = self
                    .connections
                    .as_ref()
                    .ok_or_else(|| GatewayError::Unavailable("connection manager".to_string()))?;
                Ok(TaskOutcome::Tool(manager.execute_tool(request).await?))
            }
        }
    }
}

fn message_payload(task: &Task) -> MessagePayload {
    match &task.input {
        Some(content) => MessagePayload::Text {
            content: content.clone(),
        },
        None => MessagePayload::Task(task.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::collaborators::InMemoryAgentDirectory;
    use crate::orchestrator::task::TaskStep;

    #[tokio::test]
    async fn test_validation_errors() {
        let router = TaskRouter::new(RouterConfig::default());

        let mut message = Task::simple("hi");
        message.task_type = TaskType::Communication;
        let err = router.plan(&message).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(ref m) if m == "target required"));

        let err = router.plan(&Task::new(TaskType::Tool)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(ref m) if m == "tool required"));
    }

    #[tokio::test]
    async fn test_multiple_steps_force_workflow() {
        let router = TaskRouter::new(RouterConfig::default());
        let mut task = Task::tool("echo", json!({}));
        task.steps = vec![TaskStep::new("a", "x"), TaskStep::new("b", "y")];

        let route = router.plan(&task).await.unwrap();
        assert_eq!(route.kind(), "workflow");
    }

    #[tokio::test]
    async fn test_tool_signal_wins_over_messaging() {
        let router = TaskRouter::new(RouterConfig::default()).with_agent_directory(Arc::new(
            InMemoryAgentDirectory::new(vec![AgentInfo::new("herald", &["coordination"])]),
        ));

        let route = router
            .plan(&Task::simple("read the file and notify the team"))
            .await
            .unwrap();
        match route {
            Route::Tool { request } => assert_eq!(request.tool_name, "read_file"),
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reasoning_routes_to_capable_agent() {
        let router = TaskRouter::new(RouterConfig::default()).with_agent_directory(Arc::new(
            InMemoryAgentDirectory::new(vec![AgentInfo::new("thinker", &["reasoning"])]),
        ));

        let route = router.plan(&Task::simple("explain the outage")).await.unwrap();
        assert!(matches!(route, Route::Message { ref target, .. } if target == "thinker"));
    }

    #[tokio::test]
    async fn test_missing_agent_falls_back_to_workflow() {
        let router = TaskRouter::new(RouterConfig::default())
            .with_agent_directory(Arc::new(InMemoryAgentDirectory::default()));

        let route = router.plan(&Task::simple("explain the outage")).await.unwrap();
        assert_eq!(route.kind(), "workflow");
    }

    #[tokio::test]
    async fn test_missing_subsystem_is_unavailable() {
        let router = TaskRouter::new(RouterConfig::default());
        let err = router
            .execute(Task::simple("do something vague"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[test]
    fn test_status_reflects_wiring() {
        let router = TaskRouter::new(RouterConfig::default());
        assert!(!router.status().workflow_engine);

        let router = router.with_agent_directory(Arc::new(InMemoryAgentDirectory::default()));
        let status = router.status();
        assert!(status.agent_directory);
        assert!(!status.connection_manager);
    }
}
