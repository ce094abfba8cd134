//! Shared value types exchanged between connectors and their callers.
//!
//! Wire names are camelCase so the types serialize the same way the admin
//! surface expects (`recordsProcessed`, `filePath`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::ConnectorError;

/// One loaded source record: column/field name to value, in source order.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// Connector identity
// ---------------------------------------------------------------------------

/// Type tag of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Delimited text file (CSV, TSV, ...)
    Csv,
    /// Spreadsheet workbook
    Excel,
    /// BMEcat-style XML catalog export
    Bmecat,
    /// Paginated REST collection
    Rest,
    /// External MCP tool server
    Mcp,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 5] = [
        ConnectorKind::Csv,
        ConnectorKind::Excel,
        ConnectorKind::Bmecat,
        ConnectorKind::Rest,
        ConnectorKind::Mcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Csv => "csv",
            ConnectorKind::Excel => "excel",
            ConnectorKind::Bmecat => "bmecat",
            ConnectorKind::Rest => "rest",
            ConnectorKind::Mcp => "mcp",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConnectorError::UnsupportedConnectorType(s.to_string()))
    }
}

/// A registered data source.
///
/// `config` is opaque here; each connector deserializes the shape it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
    /// Cron-like schedule, evaluated by whoever schedules syncs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Inferred type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
}

/// Ordered field list derived from connected data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Projects one source field (dot path, or `tool:`/`resource:` key for MCP)
/// onto one target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Sync outcome
// ---------------------------------------------------------------------------

/// A recoverable failure of one record (or one MCP mapping entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SyncError {
    pub fn for_row(row: usize, message: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            field: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row: None,
            field: Some(field.into()),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Summary of one `sync()` invocation. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub records_processed: usize,
    pub records_created: usize,
    pub records_updated: usize,
    pub records_failed: usize,
    pub errors: Vec<SyncError>,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connector_kind_from_str() {
        assert_eq!("csv".parse::<ConnectorKind>().unwrap(), ConnectorKind::Csv);
        assert_eq!("mcp".parse::<ConnectorKind>().unwrap(), ConnectorKind::Mcp);
        let err = "unknown".parse::<ConnectorKind>().unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedConnectorType(t) if t == "unknown"));
    }

    #[test]
    fn test_connector_config_wire_shape() {
        let config: ConnectorConfig = serde_json::from_value(json!({
            "id": "src-1",
            "name": "Supplier feed",
            "type": "bmecat",
            "config": { "filePath": "/data/catalog.xml" },
            "schedule": "0 3 * * *"
        }))
        .unwrap();
        assert_eq!(config.kind, "bmecat");
        assert_eq!(config.config["filePath"], "/data/catalog.xml");
        assert_eq!(config.schedule.as_deref(), Some("0 3 * * *"));
    }

    #[test]
    fn test_field_mapping_transform_optional() {
        let mapping: FieldMapping =
            serde_json::from_value(json!({ "source": "a.b", "target": "c" })).unwrap();
        assert_eq!(mapping, FieldMapping::new("a.b", "c"));

        let mapping = FieldMapping::new("x", "y").with_transform("trim");
        let json = serde_json::to_value(mapping).unwrap();
        assert_eq!(json, json!({ "source": "x", "target": "y", "transform": "trim" }));
    }

    #[test]
    fn test_sync_result_serializes_camel_case_with_iso_timestamp() {
        let result = SyncResult {
            success: false,
            records_processed: 2,
            records_created: 1,
            records_updated: 0,
            records_failed: 1,
            errors: vec![SyncError::for_row(1, "boom")],
            duration: 12,
            timestamp: "2024-05-01T10:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["recordsProcessed"], 2);
        assert_eq!(json["recordsFailed"], 1);
        assert_eq!(json["errors"][0], json!({ "row": 1, "message": "boom" }));
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![SchemaField {
            name: "sku".to_string(),
            field_type: FieldType::String,
            nullable: false,
            sample: Some(json!("A-1")),
        }]);
        assert_eq!(schema.field_names(), vec!["sku"]);
        assert!(schema.field("sku").is_some());
        assert!(schema.field("missing").is_none());
    }
}
