//! A spawned MCP server process and the JSON-RPC session on its stdio.

use std::process::Stdio;
use std::time::Duration;

use pimflow_core::{ConnectorError, ConnectorResult};
use serde_json::{json, Value};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::rpc::{RpcChannel, RpcError};
use super::types::{McpConfig, McpResource, McpTool, ResourcesPage, ToolsPage, PROTOCOL_VERSION};

pub struct McpClient {
    child: Child,
    channel: RpcChannel<BufReader<ChildStdout>, ChildStdin>,
    server_info: Value,
}

impl McpClient {
    /// Launch the server. The child is killed if the client is dropped.
    pub fn spawn(config: &McpConfig) -> ConnectorResult<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            ConnectorError::connection(format!("failed to spawn '{}': {}", config.command, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConnectorError::connection("MCP server stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectorError::connection("MCP server stdout is not piped"))?;

        debug!("spawned MCP server '{}' (pid {:?})", config.command, child.id());
        Ok(Self {
            child,
            channel: RpcChannel::new(BufReader::new(stdout), stdin),
            server_info: Value::Null,
        })
    }

    /// `initialize` followed by the `notifications/initialized` notification.
    pub async fn initialize(&mut self) -> Result<(), RpcError> {
        let result = self
            .channel
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "pimflow", "version": env!("CARGO_PKG_VERSION") }
                }),
            )
            .await?;
        self.server_info = result.get("serverInfo").cloned().unwrap_or(Value::Null);
        self.channel
            .notify("notifications/initialized", json!({}))
            .await?;
        let protocol = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            "MCP session initialized with {} (protocol {})",
            self.server_info, protocol
        );
        Ok(())
    }

    pub fn server_info(&self) -> &Value {
        &self.server_info
    }

    pub async fn ping(&mut self) -> Result<(), RpcError> {
        self.channel.request("ping", json!({})).await.map(|_| ())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<McpTool>, RpcError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let listed = self.channel.request("tools/list", params).await?;
            let page: ToolsPage = serde_json::from_value(listed)?;
            tools.extend(page.tools);
            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                return Ok(tools);
            }
        }
    }

    /// Servers without resource support answer method-not-found, which is
    /// reported as an empty list.
    pub async fn list_resources(&mut self) -> Result<Vec<McpResource>, RpcError> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = match self.channel.request("resources/list", params).await {
                Ok(result) => result,
                Err(e) if e.is_method_not_found() => {
                    debug!("MCP server has no resources/list");
                    return Ok(resources);
                }
                Err(e) => return Err(e),
            };
            let page: ResourcesPage = serde_json::from_value(result)?;
            resources.extend(page.resources);
            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                return Ok(resources);
            }
        }
    }

    /// Raw `tools/call` result; `isError` is left for the caller to judge.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, RpcError> {
        self.channel
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<Value, RpcError> {
        self.channel
            .request("resources/read", json!({ "uri": uri }))
            .await
    }

    /// Close stdin, give the server `grace` to exit, then kill it.
    pub async fn shutdown(self, grace: Duration) {
        let Self { mut child, channel, .. } = self;
        drop(channel);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!("MCP server exited with {}", status),
            Ok(Err(e)) => warn!("failed to wait for MCP server: {}", e),
            Err(_) => {
                warn!("MCP server did not exit within {:?}, killing it", grace);
                if let Err(e) = child.kill().await {
                    warn!("failed to kill MCP server: {}", e);
                }
            }
        }
    }
}
