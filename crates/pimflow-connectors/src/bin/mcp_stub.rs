//! Minimal stdio MCP server used by the integration tests and local demos.
//!
//! Tools: `ping`, `echo`, `fail` (answers with `isError`), `sleep`
//! (waits `ms` milliseconds). Resource: `stub://catalog/info`.
//!
//! Environment switches:
//! - `MCP_STUB_NO_RESOURCES` - answer `resources/list` with method-not-found
//! - `MCP_STUB_HANG` - never answer `initialize`

use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

const CATALOG_URI: &str = "stub://catalog/info";

struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

fn tools_page(cursor: Option<&str>) -> Value {
    let tool = |name: &str, description: &str| {
        json!({ "name": name, "description": description, "inputSchema": { "type": "object" } })
    };
    match cursor {
        None => json!({
            "tools": [tool("ping", "Answers pong"), tool("echo", "Returns its arguments")],
            "nextCursor": "page-2"
        }),
        Some(_) => json!({
            "tools": [
                tool("fail", "Always reports an error"),
                tool("sleep", "Waits for `ms` milliseconds")
            ]
        }),
    }
}

async fn call_tool(params: &Value) -> Result<Value, RpcFailure> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    match name {
        "ping" => Ok(json!({ "content": [{ "type": "text", "text": "pong" }] })),
        "echo" => Ok(json!({
            "content": [{ "type": "text", "text": arguments.to_string() }],
            "structuredContent": arguments
        })),
        "fail" => Ok(json!({
            "content": [{ "type": "text", "text": "stub failure" }],
            "isError": true
        })),
        "sleep" => {
            let ms = arguments.get("ms").and_then(Value::as_u64).unwrap_or(60_000);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({ "content": [{ "type": "text", "text": format!("slept {} ms", ms) }] }))
        }
        other => Err(RpcFailure::new(-32602, format!("unknown tool: {}", other))),
    }
}

async fn handle(method: &str, params: &Value) -> Result<Value, RpcFailure> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": params
                .get("protocolVersion")
                .cloned()
                .unwrap_or(json!("2024-11-05")),
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": { "name": "pimflow-mcp-stub", "version": env!("CARGO_PKG_VERSION") }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(tools_page(params.get("cursor").and_then(Value::as_str))),
        "tools/call" => call_tool(params).await,
        "resources/list" if std::env::var_os("MCP_STUB_NO_RESOURCES").is_some() => {
            Err(RpcFailure::new(-32601, "method not found: resources/list"))
        }
        "resources/list" => Ok(json!({
            "resources": [{
                "uri": CATALOG_URI,
                "name": "catalog-info",
                "mimeType": "application/json"
            }]
        })),
        "resources/read" => match params.get("uri").and_then(Value::as_str) {
            Some(CATALOG_URI) => Ok(json!({
                "contents": [{
                    "uri": CATALOG_URI,
                    "mimeType": "application/json",
                    "text": json!({ "catalog": "stub", "products": 3 }).to_string()
                }]
            })),
            Some(uri) => Err(RpcFailure::new(-32002, format!("resource not found: {}", uri))),
            None => Err(RpcFailure::new(-32602, "missing uri")),
        },
        other => Err(RpcFailure::new(-32601, format!("method not found: {}", other))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let hang = std::env::var_os("MCP_STUB_HANG").is_some();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("pimflow-mcp-stub ready");
    while let Some(line) = lines.next_line().await? {
        let message: Value = match serde_json::from_str(line.trim()) {
            Ok(message) => message,
            Err(e) => {
                debug!("ignoring unparsable line: {}", e);
                continue;
            }
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let Some(id) = message.get("id").cloned() else {
            debug!("notification {}", method);
            continue;
        };
        if hang && method == "initialize" {
            continue;
        }

        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let reply = match handle(method, &params).await {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(failure) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": failure.code, "message": failure.message }
            }),
        };
        let mut bytes = serde_json::to_vec(&reply)?;
        bytes.push(b'\n');
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, exiting");
    Ok(())
}
