//! pimflow connectors - data source adapters
//!
//! This crate provides connectors for the data sources product data is
//! pulled from:
//! - Delimited text files (CSV/TSV)
//! - Spreadsheet workbooks (xlsx/xls/ods)
//! - BMEcat XML catalogs
//! - Paginated REST collections
//! - MCP tool servers (stdio JSON-RPC)
//!
//! Every connector implements [`Connector`]. Instances are built through the
//! [`ConnectorRegistry`] from a type tag.

pub mod bmecat;
pub mod csv_connector;
pub mod excel;
pub mod factory;
pub mod mcp;
pub mod records;
pub mod rest;
pub mod runner;

pub use bmecat::{BmecatConnector, CatalogInfo};
pub use csv_connector::CsvConnector;
pub use excel::ExcelConnector;
pub use factory::{
    create_connector, default_registry, ConnectorDescriptor, ConnectorFactory, ConnectorRegistry,
};
pub use mcp::{McpConnector, McpResource, McpTool};
pub use rest::RestConnector;
pub use runner::SyncRunner;

use std::time::Duration;

use async_trait::async_trait;
use pimflow_core::{
    ConnectorError, ConnectorKind, ConnectorResult, DiscardSink, FieldMapping, Record, RecordSink,
    Schema, SyncResult,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default number of records returned by `preview`.
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Lifecycle shared by every data source.
///
/// A connector owns one underlying source handle and is driven by a single
/// caller at a time: `connect`, `disconnect` and `sync` must not run
/// concurrently on the same instance. Run several instances to sync several
/// sources in parallel.
#[async_trait]
pub trait Connector: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn kind(&self) -> ConnectorKind;

    fn is_connected(&self) -> bool;

    /// Perform the source handshake and load data. On failure the connector
    /// stays unconnected. Calling it again re-fetches.
    async fn connect(&mut self, config: &Value) -> ConnectorResult<()>;

    /// Release the source handle. Idempotent and infallible.
    async fn disconnect(&mut self);

    /// Cheap reachability probe. Never errors; any failure is `false`.
    async fn test_connection(&self) -> bool;

    async fn get_schema(&self) -> ConnectorResult<Schema>;

    /// At most `limit` records, without changing connector state.
    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>>;

    /// Project every loaded record through `mapping`, handing successful
    /// projections to `sink` in load order. Per-record failures are
    /// collected in the result and never abort the run.
    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult>;

    async fn sync(&self, mapping: &[FieldMapping]) -> ConnectorResult<SyncResult> {
        self.sync_into(mapping, &mut DiscardSink).await
    }

    /// Guard for data-accessing operations.
    fn ensure_connected(&self) -> ConnectorResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectorError::NotConnected(self.name().to_string()))
        }
    }
}

/// Run `connect` under a deadline. On expiry the connector is reset and a
/// [`ConnectorError::Timeout`] is returned.
pub async fn connect_with_timeout(
    connector: &mut dyn Connector,
    config: &Value,
    timeout: Duration,
) -> ConnectorResult<()> {
    let outcome = tokio::time::timeout(timeout, connector.connect(config)).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            connector.disconnect().await;
            Err(ConnectorError::Timeout(timeout.as_millis() as u64))
        }
    }
}

/// Deserialize a connector's typed config from the opaque config map.
pub(crate) fn parse_config<T: DeserializeOwned>(
    kind: ConnectorKind,
    config: &Value,
) -> ConnectorResult<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| ConnectorError::connection(format!("invalid {} config: {}", kind, e)))
}
