//! Connector factory: build a connector from its type tag.

use std::sync::Arc;

use pimflow_core::{ConnectorConfig, ConnectorError, ConnectorKind, ConnectorResult};
use serde::Serialize;
use tracing::debug;

use crate::{BmecatConnector, Connector, CsvConnector, ExcelConnector, McpConnector, RestConnector};

/// What a registered connector type is, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorDescriptor {
    #[serde(rename = "type")]
    pub kind: ConnectorKind,
    pub description: &'static str,
}

/// Builds unconnected connector instances of one kind.
pub trait ConnectorFactory: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    fn description(&self) -> &'static str;

    /// Returns `true` if this factory builds connectors for `type_tag`.
    fn can_handle(&self, type_tag: &str) -> bool {
        type_tag.trim().eq_ignore_ascii_case(self.kind().as_str())
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector>;

    fn descriptor(&self) -> ConnectorDescriptor {
        ConnectorDescriptor {
            kind: self.kind(),
            description: self.description(),
        }
    }
}

/// Registry of connector factories. Delegates to the first factory that can
/// handle a type tag.
pub struct ConnectorRegistry {
    factories: Vec<Arc<dyn ConnectorFactory>>,
}

impl ConnectorRegistry {
    pub fn new(factories: Vec<Arc<dyn ConnectorFactory>>) -> Self {
        Self { factories }
    }

    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) {
        self.factories.push(factory);
    }

    pub fn create(
        &self,
        type_tag: &str,
        id: &str,
        name: &str,
    ) -> ConnectorResult<Box<dyn Connector>> {
        let factory = self
            .factories
            .iter()
            .find(|f| f.can_handle(type_tag))
            .ok_or_else(|| ConnectorError::UnsupportedConnectorType(type_tag.to_string()))?;
        debug!("Creating {} connector '{}' ({})", factory.kind(), name, id);
        Ok(factory.create(id, name))
    }

    /// Build the connector a stored configuration describes. The returned
    /// instance is not connected yet.
    pub fn from_config(&self, config: &ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> {
        self.create(&config.kind, &config.id, &config.name)
    }

    pub fn descriptors(&self) -> Vec<ConnectorDescriptor> {
        self.factories.iter().map(|f| f.descriptor()).collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in factory implementations
// ---------------------------------------------------------------------------

pub struct CsvFactory;

impl ConnectorFactory for CsvFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Csv
    }

    fn description(&self) -> &'static str {
        "Delimited text file (CSV/TSV) with a header row"
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector> {
        Box::new(CsvConnector::new(id, name))
    }
}

pub struct ExcelFactory;

impl ConnectorFactory for ExcelFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Excel
    }

    fn description(&self) -> &'static str {
        "Spreadsheet workbook (xlsx, xlsm, xls, ods), one sheet"
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector> {
        Box::new(ExcelConnector::new(id, name))
    }
}

pub struct BmecatFactory;

impl ConnectorFactory for BmecatFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Bmecat
    }

    fn description(&self) -> &'static str {
        "BMEcat 1.2 / 2005 XML product catalog"
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector> {
        Box::new(BmecatConnector::new(id, name))
    }
}

pub struct RestFactory;

impl ConnectorFactory for RestFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Rest
    }

    fn description(&self) -> &'static str {
        "Paginated JSON REST collection"
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector> {
        Box::new(RestConnector::new(id, name))
    }
}

pub struct McpFactory;

impl ConnectorFactory for McpFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Mcp
    }

    fn description(&self) -> &'static str {
        "MCP tool server spawned over stdio"
    }

    fn create(&self, id: &str, name: &str) -> Box<dyn Connector> {
        Box::new(McpConnector::new(id, name))
    }
}

/// Build the default registry with all built-in factories.
pub fn default_registry() -> ConnectorRegistry {
    ConnectorRegistry::new(vec![
        Arc::new(CsvFactory),
        Arc::new(ExcelFactory),
        Arc::new(BmecatFactory),
        Arc::new(RestFactory),
        Arc::new(McpFactory),
    ])
}

/// Create an unconnected connector from the built-in set.
pub fn create_connector(
    type_tag: &str,
    id: &str,
    name: &str,
) -> ConnectorResult<Box<dyn Connector>> {
    default_registry().create(type_tag, id, name)
}
