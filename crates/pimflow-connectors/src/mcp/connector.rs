//! [`Connector`] implementation over an MCP client session.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use pimflow_core::{
    ConnectorError, ConnectorKind, ConnectorResult, FieldMapping, FieldType, Record, RecordSink,
    Schema, SchemaField, SyncError, SyncResult, SyncTracker, Transform,
};
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::client::McpClient;
use super::rpc::RpcError;
use super::types::{result_text, McpConfig, McpResource, McpTool};
use crate::{parse_config, Connector};

const TOOL_PREFIX: &str = "tool:";
const RESOURCE_PREFIX: &str = "resource:";

/// Proxy to a tool server speaking MCP over stdio.
///
/// The session sits behind an async mutex so that `&self` operations can
/// issue calls; calls on one connector are still serialized.
pub struct McpConnector {
    id: String,
    name: String,
    config: Option<McpConfig>,
    session: Mutex<Option<McpClient>>,
    tools: Vec<McpTool>,
    resources: Vec<McpResource>,
    connected: bool,
}

impl McpConnector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            session: Mutex::new(None),
            tools: Vec::new(),
            resources: Vec::new(),
            connected: false,
        }
    }

    /// Tools listed during `connect`.
    pub fn cached_tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Resources listed during `connect`.
    pub fn cached_resources(&self) -> &[McpResource] {
        &self.resources
    }

    fn request_timeout(&self) -> Duration {
        self.config
            .as_ref()
            .map(McpConfig::request_timeout)
            .unwrap_or(Duration::from_secs(30))
    }

    async fn lock_session(&self) -> ConnectorResult<MutexGuard<'_, Option<McpClient>>> {
        self.ensure_connected()?;
        Ok(self.session.lock().await)
    }

    fn live<'a>(&self, session: &'a mut Option<McpClient>) -> ConnectorResult<&'a mut McpClient> {
        session
            .as_mut()
            .ok_or_else(|| ConnectorError::NotConnected(self.name.clone()))
    }

    /// Await one RPC under the request timeout.
    async fn timed<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, RpcError>> + Send,
    ) -> ConnectorResult<T> {
        let timeout = self.request_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ConnectorError::tool(format!("{}: {}", what, e))),
            Err(_) => Err(ConnectorError::tool(format!(
                "{}: no response within {} ms",
                what,
                timeout.as_millis()
            ))),
        }
    }

    pub async fn get_tools(&self) -> ConnectorResult<Vec<McpTool>> {
        let mut session = self.lock_session().await?;
        let client = self.live(&mut session)?;
        self.timed("tools/list", client.list_tools()).await
    }

    pub async fn get_resources(&self) -> ConnectorResult<Vec<McpResource>> {
        let mut session = self.lock_session().await?;
        let client = self.live(&mut session)?;
        self.timed("resources/list", client.list_resources()).await
    }

    /// Invoke a tool. A result flagged `isError` is a failure.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ConnectorResult<Value> {
        let mut session = self.lock_session().await?;
        let client = self.live(&mut session)?;
        let what = format!("tools/call '{}'", name);
        let result = self.timed(&what, client.call_tool(name, arguments)).await?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let detail = result_text(&result).unwrap_or_else(|| result.to_string());
            let message = format!("tool '{}' reported an error: {}", name, detail);
            return Err(ConnectorError::tool(message));
        }
        Ok(result)
    }

    pub async fn read_resource(&self, uri: &str) -> ConnectorResult<Value> {
        let mut session = self.lock_session().await?;
        let client = self.live(&mut session)?;
        let what = format!("resources/read '{}'", uri);
        self.timed(&what, client.read_resource(uri)).await
    }

    async fn fetch_source(&self, source: &str) -> ConnectorResult<Value> {
        if let Some(tool) = source.strip_prefix(TOOL_PREFIX) {
            self.call_tool(tool, json!({})).await
        } else if let Some(uri) = source.strip_prefix(RESOURCE_PREFIX) {
            self.read_resource(uri).await
        } else {
            Err(ConnectorError::tool(format!(
                "source '{}' must start with '{}' or '{}'",
                source, TOOL_PREFIX, RESOURCE_PREFIX
            )))
        }
    }

    async fn handshake(
        config: &McpConfig,
    ) -> ConnectorResult<(McpClient, Vec<McpTool>, Vec<McpResource>)> {
        let mut client = McpClient::spawn(config)?;
        let failed = |step: &str, e: RpcError| {
            let command = &config.command;
            ConnectorError::connection(format!("MCP {} with '{}' failed: {}", step, command, e))
        };
        client.initialize().await.map_err(|e| failed("initialize", e))?;
        let tools = client.list_tools().await.map_err(|e| failed("tools/list", e))?;
        let resources = client
            .list_resources()
            .await
            .map_err(|e| failed("resources/list", e))?;
        Ok((client, tools, resources))
    }
}

fn tool_field(tool: &McpTool) -> SchemaField {
    SchemaField {
        name: format!("{}{}", TOOL_PREFIX, tool.name),
        field_type: FieldType::Object,
        nullable: true,
        sample: None,
    }
}

fn resource_field(resource: &McpResource) -> SchemaField {
    SchemaField {
        name: format!("{}{}", RESOURCE_PREFIX, resource.uri),
        field_type: FieldType::Object,
        nullable: true,
        sample: None,
    }
}

#[async_trait]
impl Connector for McpConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Mcp
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    /// Spawn the server, handshake and list its tools and resources, all
    /// within `connectTimeoutMs`. On expiry the child is killed and a
    /// connection error returned.
    async fn connect(&mut self, config: &Value) -> ConnectorResult<()> {
        self.disconnect().await;
        let config: McpConfig = parse_config(ConnectorKind::Mcp, config)?;
        let timeout = config.connect_timeout();
        self.config = Some(config.clone());

        let handshake = tokio::time::timeout(timeout, Self::handshake(&config)).await;
        let (client, tools, resources) = match handshake {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectorError::connection(format!(
                    "MCP server '{}' did not complete the handshake within {} ms",
                    config.command,
                    timeout.as_millis()
                )))
            }
        };

        info!(
            "McpConnector '{}': connected to '{}' with {} tools and {} resources",
            self.name,
            config.command,
            tools.len(),
            resources.len()
        );
        *self.session.get_mut() = Some(client);
        self.tools = tools;
        self.resources = resources;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.session.get_mut().take() {
            let grace = self
                .config
                .as_ref()
                .map(McpConfig::shutdown_grace)
                .unwrap_or(Duration::from_secs(2));
            client.shutdown(grace).await;
            info!("McpConnector '{}': disconnected", self.name);
        }
        self.tools.clear();
        self.resources.clear();
        self.connected = false;
    }

    async fn test_connection(&self) -> bool {
        let result = match self.lock_session().await {
            Ok(mut session) => match self.live(&mut session) {
                Ok(client) => self.timed("ping", client.ping()).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("McpConnector '{}': ping failed: {}", self.name, e);
                false
            }
        }
    }

    async fn get_schema(&self) -> ConnectorResult<Schema> {
        self.ensure_connected()?;
        let fields = self
            .tools
            .iter()
            .map(tool_field)
            .chain(self.resources.iter().map(resource_field))
            .collect();
        Ok(Schema::new(fields))
    }

    /// Descriptors of the known tools, then resources.
    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>> {
        self.ensure_connected()?;
        let tools = self.tools.iter().map(|t| {
            json!({
                "kind": "tool",
                "name": t.name,
                "description": t.description,
                "inputSchema": t.input_schema
            })
        });
        let resources = self.resources.iter().map(|r| {
            json!({ "kind": "resource", "uri": r.uri, "name": r.name, "mimeType": r.mime_type })
        });
        Ok(tools
            .chain(resources)
            .filter_map(|v| v.as_object().cloned())
            .take(limit)
            .collect())
    }

    /// Each mapping entry is one unit of work: its source is fetched, the
    /// transform applied and `{target: value}` handed to the sink.
    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        self.ensure_connected()?;
        let mut tracker = SyncTracker::start();

        for entry in mapping {
            let outcome = match self.fetch_source(&entry.source).await {
                Ok(value) => match &entry.transform {
                    Some(name) => name
                        .parse::<Transform>()
                        .and_then(|t| t.apply(value))
                        .map_err(|e| e.to_string()),
                    None => Ok(value),
                },
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(value) => {
                    let mut record = Record::new();
                    record.insert(entry.target.clone(), value);
                    sink.accept(record);
                    tracker.created();
                }
                Err(message) => {
                    debug!("{}: mapping '{}' failed: {}", self.name, entry.source, message);
                    tracker.failed(SyncError::for_field(entry.source.clone(), message));
                }
            }
        }

        let result = tracker.finish();
        info!(
            "{}: synced {} mapping entries ({} created, {} failed) in {}ms",
            self.name,
            result.records_processed,
            result.records_created,
            result.records_failed,
            result.duration
        );
        Ok(result)
    }
}
