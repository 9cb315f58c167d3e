mod common;

use agentlink::adapter::{MessageEnvelope, MessagePayload, ProtocolAdapter};
use agentlink::core::types::{ResourceReadRequest, ToolExecutionRequest};
use agentlink::utils::errors::GatewayError;
use common::{default_manager, server, MockServer, MockTransportFactory};
use serde_json::json;

#[tokio::test]
async fn test_handle_tool_call_envelope() {
    let factory = MockTransportFactory::new();
    let fs = factory.register(MockServer::new("fs").with_tools(&["read_file"]));
    let manager = default_manager(factory.clone());
    manager.connect(server("fs")).await.unwrap();

    let gateway = ProtocolAdapter::new("gateway");
    let planner = ProtocolAdapter::new("planner");
    let inbound = planner.tool_call(
        "gateway",
        ToolExecutionRequest::new("read_file", json!({ "path": "/a" })),
    );

    let reply = gateway.handle(&manager, inbound.clone()).await.unwrap();
    assert_eq!(reply.from, "gateway");
    assert_eq!(reply.to, "planner");
    assert_eq!(reply.correlation_id.as_deref(), Some(inbound.id.as_str()));

    match reply.payload {
        MessagePayload::ToolResult(response) => {
            assert!(response.success);
            assert_eq!(response.result.unwrap()["arguments"]["path"], "/a");
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(fs.call_count("read_file"), 1);
}

#[tokio::test]
async fn test_failed_call_becomes_unsuccessful_reply() {
    let factory = MockTransportFactory::new();
    let manager = default_manager(factory.clone());
    let gateway = ProtocolAdapter::new("gateway");

    let inbound = MessageEnvelope::new(
        "planner",
        "gateway",
        MessagePayload::ToolCall(ToolExecutionRequest::new("missing_tool", json!({}))),
    );
    let reply = gateway.handle(&manager, inbound).await.unwrap();

    match reply.payload {
        MessagePayload::ToolResult(response) => {
            assert!(!response.success);
            assert_eq!(response.tool_name, "missing_tool");
            assert!(response.error.unwrap().contains("missing_tool"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_handle_resource_read_envelope() {
    let factory = MockTransportFactory::new();
    factory.register(MockServer::new("docs").with_resource("doc://a", "alpha"));
    let manager = default_manager(factory.clone());
    manager.connect(server("docs")).await.unwrap();

    let gateway = ProtocolAdapter::new("gateway");
    let inbound = ProtocolAdapter::new("planner")
        .resource_read("gateway", ResourceReadRequest::new("doc://a").on_server("docs"));
    let reply = gateway.handle(&manager, inbound).await.unwrap();

    match reply.payload {
        MessagePayload::ResourceContents(response) => {
            assert!(response.success);
            assert_eq!(response.server_name, "docs");
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_handle_rejects_non_request_payloads() {
    let manager = default_manager(MockTransportFactory::new());
    let inbound = MessageEnvelope::new(
        "planner",
        "gateway",
        MessagePayload::Text {
            content: "hello".to_string(),
        },
    );

    let err = ProtocolAdapter::new("gateway")
        .handle(&manager, inbound)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}
