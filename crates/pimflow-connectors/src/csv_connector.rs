//! Delimited-text connector.
//!
//! Reads the whole file into memory at `connect()`. The first row holds the
//! field names; fully blank rows are skipped and every value stays text so
//! schema inference decides the type.

use std::path::PathBuf;

use async_trait::async_trait;
use pimflow_core::{
    infer_schema, ConnectorError, ConnectorKind, ConnectorResult, FieldMapping, Record, RecordSink,
    Schema, SyncResult,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::records::{preview_records, sync_records, unique_headers};
use crate::{parse_config, Connector};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvConfig {
    pub file_path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Resolve the configured delimiter to a single byte. `tab` and `\t` are
/// accepted as aliases for a tab character.
pub fn delimiter_byte(delimiter: &str) -> ConnectorResult<u8> {
    match delimiter {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
        d => Err(ConnectorError::connection(format!(
            "delimiter must be a single ASCII character, got '{}'",
            d
        ))),
    }
}

/// Parse delimited text into (header names, records). Repeated header
/// names are suffixed so every column survives.
pub fn parse_delimited(
    data: &[u8],
    delimiter: u8,
) -> Result<(Vec<String>, Vec<Record>), csv::Error> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = unique_headers(reader.headers()?.iter().map(str::to_string));

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row.get(i).unwrap_or_default();
                (name.clone(), Value::String(value.to_string()))
            })
            .collect();
        records.push(record);
    }

    Ok((headers, records))
}

pub struct CsvConnector {
    id: String,
    name: String,
    config: Option<CsvConfig>,
    headers: Vec<String>,
    records: Vec<Record>,
    connected: bool,
}

impl CsvConnector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            headers: Vec::new(),
            records: Vec::new(),
            connected: false,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl Connector for CsvConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Csv
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, config: &Value) -> ConnectorResult<()> {
        self.connected = false;
        let config: CsvConfig = parse_config(ConnectorKind::Csv, config)?;
        let delimiter = delimiter_byte(&config.delimiter)?;
        self.config = Some(config.clone());

        let path = config.file_path.display();
        let data = tokio::fs::read(&config.file_path)
            .await
            .map_err(|e| ConnectorError::connection(format!("failed to read {}: {}", path, e)))?;
        let (headers, records) = parse_delimited(&data, delimiter)
            .map_err(|e| ConnectorError::connection(format!("failed to parse {}: {}", path, e)))?;

        if headers.is_empty() {
            warn!("CSV file {} has no header row", path);
        }
        info!(
            "CsvConnector '{}': loaded {} rows x {} columns from {}",
            self.name,
            records.len(),
            headers.len(),
            path
        );

        self.headers = headers;
        self.records = records;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.headers.clear();
        self.records.clear();
        self.connected = false;
    }

    async fn test_connection(&self) -> bool {
        match &self.config {
            Some(config) => tokio::fs::metadata(&config.file_path)
                .await
                .is_ok_and(|m| m.is_file()),
            None => false,
        }
    }

    async fn get_schema(&self) -> ConnectorResult<Schema> {
        self.ensure_connected()?;
        Ok(infer_schema(&self.headers, &self.records))
    }

    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>> {
        self.ensure_connected()?;
        Ok(preview_records(&self.records, limit))
    }

    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        self.ensure_connected()?;
        Ok(sync_records(&self.name, &self.records, mapping, sink))
    }
}
