//! MCP connector against the bundled stdio stub server.

use std::time::{Duration, Instant};

use pimflow_connectors::{connect_with_timeout, Connector, McpConnector};
use pimflow_core::{ConnectorError, FieldMapping, Record};
use serde_json::{json, Value};

const STUB: &str = env!("CARGO_BIN_EXE_pimflow-mcp-stub");

fn stub_config() -> Value {
    json!({ "command": STUB, "args": [] })
}

async fn connected() -> McpConnector {
    let mut connector = McpConnector::new("m-1", "Stub tools");
    connector.connect(&stub_config()).await.unwrap();
    connector
}

#[tokio::test]
async fn test_connect_lists_tools_and_resources() {
    let mut connector = connected().await;
    assert!(connector.is_connected());
    assert!(connector.test_connection().await);

    let names: Vec<&str> = connector.cached_tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["ping", "echo", "fail", "sleep"]);
    assert_eq!(connector.cached_resources()[0].uri, "stub://catalog/info");

    let live = connector.get_tools().await.unwrap();
    assert_eq!(live.len(), 4);
    assert_eq!(connector.get_resources().await.unwrap().len(), 1);

    connector.disconnect().await;
    assert!(!connector.is_connected());
    assert!(connector.cached_tools().is_empty());
    assert!(!connector.test_connection().await);
}

#[tokio::test]
async fn test_schema_and_preview() {
    let mut connector = connected().await;

    let schema = connector.get_schema().await.unwrap();
    assert_eq!(
        schema.field_names(),
        vec!["tool:ping", "tool:echo", "tool:fail", "tool:sleep", "resource:stub://catalog/info"]
    );

    let preview = connector.preview(2).await.unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(preview[0]["kind"], "tool");
    assert_eq!(preview[0]["name"], "ping");

    connector.disconnect().await;
}

#[tokio::test]
async fn test_call_tool_and_read_resource() {
    let mut connector = connected().await;

    let echoed = connector.call_tool("echo", json!({ "sku": "A1" })).await.unwrap();
    assert_eq!(echoed["structuredContent"], json!({ "sku": "A1" }));

    let err = connector.call_tool("fail", json!({})).await.unwrap_err();
    assert!(matches!(err, ConnectorError::ToolInvocation(ref msg) if msg.contains("stub failure")));

    let err = connector.call_tool("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, ConnectorError::ToolInvocation(_)));

    let content = connector.read_resource("stub://catalog/info").await.unwrap();
    assert_eq!(content["contents"][0]["mimeType"], "application/json");
    assert!(connector.read_resource("stub://missing").await.is_err());

    // The session survives failed calls.
    assert!(connector.test_connection().await);
    connector.disconnect().await;
}

#[tokio::test]
async fn test_sync_ping_mapping() {
    let mut connector = connected().await;

    let mut out: Vec<Record> = Vec::new();
    let result = connector
        .sync_into(&[FieldMapping::new("tool:ping", "pong")], &mut out)
        .await
        .unwrap();
    assert_eq!(result.records_processed, 1);
    assert_eq!(result.records_created, 1);
    assert_eq!(result.records_failed, 0);
    assert!(result.success);
    assert_eq!(out[0]["pong"]["content"][0]["text"], "pong");

    connector.disconnect().await;
}

#[tokio::test]
async fn test_sync_isolates_failed_mappings() {
    let mut connector = connected().await;

    let mapping = vec![
        FieldMapping::new("tool:fail", "a"),
        FieldMapping::new("resource:stub://catalog/info", "info"),
        FieldMapping::new("plain_field", "b"),
    ];
    let result = connector.sync(&mapping).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.records_processed, 3);
    assert_eq!(result.records_created, 1);
    assert_eq!(result.records_failed, 2);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].field.as_deref(), Some("tool:fail"));
    assert_eq!(result.errors[1].field.as_deref(), Some("plain_field"));
    assert!(result.errors.iter().all(|e| e.row.is_none()));

    connector.disconnect().await;
}

#[tokio::test]
async fn test_server_without_resources() {
    let mut connector = McpConnector::new("m-1", "Stub tools");
    connector
        .connect(&json!({ "command": STUB, "env": { "MCP_STUB_NO_RESOURCES": "1" } }))
        .await
        .unwrap();
    assert!(connector.cached_resources().is_empty());
    assert_eq!(connector.get_schema().await.unwrap().len(), 4);
    connector.disconnect().await;
}

#[tokio::test]
async fn test_hanging_server_times_out_as_connection_error() {
    let mut connector = McpConnector::new("m-1", "Stub tools");
    let started = Instant::now();
    let err = connector
        .connect(&json!({
            "command": STUB,
            "env": { "MCP_STUB_HANG": "1" },
            "connectTimeoutMs": 300
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::Connection(ref msg) if msg.contains("300 ms")));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!connector.is_connected());
}

#[tokio::test]
async fn test_request_timeout_is_tool_error() {
    let mut connector = McpConnector::new("m-1", "Stub tools");
    connector
        .connect(&json!({ "command": STUB, "requestTimeoutMs": 200, "shutdownGraceMs": 200 }))
        .await
        .unwrap();

    let err = connector.call_tool("sleep", json!({ "ms": 5000 })).await.unwrap_err();
    assert!(matches!(err, ConnectorError::ToolInvocation(ref msg) if msg.contains("no response")));

    // The stub is still sleeping; disconnect must not wait for it.
    let started = Instant::now();
    connector.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_generic_connect_timeout_wrapper() {
    let mut connector = McpConnector::new("m-1", "Stub tools");
    let err = connect_with_timeout(
        &mut connector,
        &json!({ "command": STUB, "env": { "MCP_STUB_HANG": "1" } }),
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectorError::Timeout(200)));
    assert!(!connector.is_connected());
}
