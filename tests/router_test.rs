mod common;

use agentlink::adapter::{MessageEnvelope, MessagePayload};
use agentlink::orchestrator::{
    AgentInfo, InMemoryAgentDirectory, MessageBus, RouterConfig, Task, TaskMetadata, TaskOutcome,
    TaskRouter, TaskStep, TaskType, WorkflowEngine, WorkflowGraph,
};
use agentlink::utils::errors::{GatewayError, GatewayResult};
use async_trait::async_trait;
use common::{default_manager, server, MockServer, MockTransportFactory};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Default)]
struct RecordingEngine {
    graphs: Mutex<Vec<WorkflowGraph>>,
}

#[async_trait]
impl WorkflowEngine for RecordingEngine {
    async fn execute(&self, graph: WorkflowGraph) -> GatewayResult<Value> {
        let nodes = graph.nodes.len();
        self.graphs.lock().push(graph);
        Ok(json!({ "nodes": nodes }))
    }
}

#[derive(Default)]
struct RecordingBus {
    sent: Mutex<Vec<MessageEnvelope>>,
    fail: bool,
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn send(&self, envelope: MessageEnvelope) -> GatewayResult<Value> {
        if self.fail {
            return Err(GatewayError::Collaborator("bus down".to_string()));
        }
        let to = envelope.to.clone();
        self.sent.lock().push(envelope);
        Ok(json!({ "delivered": to }))
    }
}

fn directory(agents: Vec<AgentInfo>) -> Arc<InMemoryAgentDirectory> {
    Arc::new(InMemoryAgentDirectory::new(agents))
}

#[tokio::test]
async fn test_tool_task_runs_through_manager() {
    let factory = MockTransportFactory::new();
    let fs = factory.register(MockServer::new("fs").with_tools(&["read_file"]));
    let manager = default_manager(factory.clone());
    manager.connect(server("fs")).await.unwrap();

    let router = TaskRouter::new(RouterConfig::default()).with_connection_manager(manager);
    let outcome = router
        .execute(Task::tool("read_file", json!({ "path": "/etc/hosts" })))
        .await
        .unwrap();

    match outcome {
        TaskOutcome::Tool(response) => {
            assert!(response.success);
            assert_eq!(response.server_name, "fs");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fs.call_count("read_file"), 1);
}

#[tokio::test]
async fn test_analyzed_tool_task_uses_hinted_tool() {
    let factory = MockTransportFactory::new();
    let fs = factory.register(MockServer::new("fs").with_tools(&["read_file", "write_file"]));
    let manager = default_manager(factory.clone());
    manager.connect(server("fs")).await.unwrap();

    let router = TaskRouter::new(RouterConfig::default()).with_connection_manager(manager);
    router
        .execute(Task::simple("save the report to a file"))
        .await
        .unwrap();

    assert_eq!(fs.call_count("write_file"), 1);
    assert_eq!(fs.call_count("read_file"), 0);
}

#[tokio::test]
async fn test_vague_task_falls_back_to_workflow() {
    let engine = Arc::new(RecordingEngine::default());
    let router = TaskRouter::new(RouterConfig::default()).with_workflow_engine(engine.clone());

    let outcome = router
        .execute(Task::simple("something vague").with_name("vague"))
        .await
        .unwrap();

    assert_eq!(outcome, TaskOutcome::Workflow(json!({ "nodes": 1 })));
    let graphs = engine.graphs.lock();
    assert_eq!(graphs[0].nodes[0].id, "main");
    assert_eq!(graphs[0].nodes[0].action, "vague");
}

#[tokio::test]
async fn test_workflow_steps_keep_dependencies() {
    let engine = Arc::new(RecordingEngine::default());
    let router = TaskRouter::new(RouterConfig::default()).with_workflow_engine(engine.clone());

    let task = Task::workflow(vec![
        TaskStep::new("fetch", "download"),
        TaskStep::new("parse", "parse"),
        TaskStep::new("notify", "email").after(&["fetch"]),
    ]);
    router.execute(task).await.unwrap();

    let graphs = engine.graphs.lock();
    let nodes = &graphs[0].nodes;
    assert_eq!(nodes[1].depends_on, vec!["fetch".to_string()]);
    assert_eq!(nodes[2].depends_on, vec!["fetch".to_string()]);
}

#[tokio::test]
async fn test_bad_step_graph_is_validation_error() {
    let engine = Arc::new(RecordingEngine::default());
    let router = TaskRouter::new(RouterConfig::default()).with_workflow_engine(engine.clone());

    let task = Task::workflow(vec![
        TaskStep::new("a", "x"),
        TaskStep::new("b", "y").after(&["missing"]),
    ]);
    let err = router.execute(task).await.unwrap_err();

    assert!(matches!(err, GatewayError::Validation(_)));
    assert!(engine.graphs.lock().is_empty());
}

#[tokio::test]
async fn test_communication_task_is_correlated() {
    let bus = Arc::new(RecordingBus::default());
    let router = TaskRouter::new(RouterConfig::default()).with_message_bus(bus.clone());

    let task = Task::message("auditor", "please review");
    let task_id = task.id.clone();
    let outcome = router.execute(task).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Message(json!({ "delivered": "auditor" })));
    let sent = bus.sent.lock();
    assert_eq!(sent[0].from, "agentlink");
    assert_eq!(sent[0].correlation_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(
        sent[0].payload,
        MessagePayload::Text {
            content: "please review".to_string()
        }
    );
}

#[tokio::test]
async fn test_coordination_goes_to_capable_agent() {
    let bus = Arc::new(RecordingBus::default());
    let router = TaskRouter::new(RouterConfig::default())
        .with_message_bus(bus.clone())
        .with_agent_directory(directory(vec![
            AgentInfo::new("thinker", &["reasoning"]),
            AgentInfo::new("herald", &["coordination"]),
        ]));

    router
        .execute(Task::simple("coordinate with the ops team"))
        .await
        .unwrap();

    let sent = bus.sent.lock();
    assert_eq!(sent[0].to, "herald");
    assert!(matches!(sent[0].payload, MessagePayload::Task(_)));
}

#[tokio::test]
async fn test_metadata_hints_are_trusted() {
    let router = TaskRouter::new(RouterConfig::default()).with_agent_directory(directory(vec![
        AgentInfo::new("translator", &["translation"]),
    ]));

    let task = Task::simple("read this file").with_metadata(TaskMetadata {
        capability: Some("translation".to_string()),
        ..Default::default()
    });
    let route = router.plan(&task).await.unwrap();

    assert_eq!(route.kind(), "message");
    let analysis = router.analyze(&task);
    assert_eq!(analysis.confidence, 1.0);
    assert!(!analysis.requires_tools);
}

#[tokio::test]
async fn test_collaborator_errors_propagate() {
    let bus = Arc::new(RecordingBus {
        fail: true,
        ..Default::default()
    });
    let router = TaskRouter::new(RouterConfig::default()).with_message_bus(bus);

    let err = router
        .execute(Task::message("auditor", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Collaborator(ref m) if m == "bus down"));
}

#[tokio::test]
async fn test_tool_task_without_manager_is_unavailable() {
    let router = TaskRouter::new(RouterConfig::default());
    let mut task = Task::new(TaskType::Tool);
    task.tool = Some("read_file".to_string());

    let err = router.execute(task).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));
}
