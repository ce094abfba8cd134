//! Spreadsheet connector backed by `calamine` (xlsx, xlsm, xls, ods).
//!
//! Cells keep their native types where JSON has one: numbers stay numbers,
//! booleans stay booleans, date cells become ISO-8601 strings and empty
//! cells become `null`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Timelike;
use pimflow_core::{
    infer_schema, ConnectorError, ConnectorKind, ConnectorResult, FieldMapping, Record, RecordSink,
    Schema, SyncResult,
};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::info;

use crate::records::{preview_records, sync_records, unique_headers};
use crate::{parse_config, Connector};

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelConfig {
    pub file_path: PathBuf,
    /// Defaults to the first sheet of the workbook.
    #[serde(default)]
    pub sheet_name: Option<String>,
}

/// Everything read from a workbook at connect time.
#[derive(Debug, Default)]
pub struct LoadedSheet {
    pub sheet_names: Vec<String>,
    pub sheet: String,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

/// Convert one cell to JSON.
pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Number((*i).into()),
        Data::Float(f) => float_to_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts)
                if ts.time().num_seconds_from_midnight() == 0 && ts.time().nanosecond() == 0 =>
            {
                Value::String(ts.format("%Y-%m-%d").to_string())
            }
            Some(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => float_to_value(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(e.to_string()),
    }
}

fn float_to_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::Number((f as i64).into())
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn header_name(cell: &Data, index: usize) -> String {
    let name = cell.to_string();
    let name = name.trim();
    if name.is_empty() {
        format!("column_{}", index + 1)
    } else {
        name.to_string()
    }
}

/// Read one sheet of a workbook: first row is the header, blank rows are
/// skipped.
pub fn load_sheet(path: &Path, sheet_name: Option<&str>) -> ConnectorResult<LoadedSheet> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        ConnectorError::connection(format!("failed to open workbook {}: {}", path.display(), e))
    })?;
    let sheet_names = workbook.sheet_names();

    let sheet = match sheet_name {
        Some(name) if sheet_names.iter().any(|s| s == name) => name.to_string(),
        Some(name) => {
            return Err(ConnectorError::connection(format!(
                "sheet '{}' not found in {} (available: {})",
                name,
                path.display(),
                sheet_names.join(", ")
            )))
        }
        None => sheet_names.first().cloned().ok_or_else(|| {
            ConnectorError::connection(format!("workbook {} has no sheets", path.display()))
        })?,
    };

    let range = workbook.worksheet_range(&sheet).map_err(|e| {
        ConnectorError::connection(format!("failed to read sheet '{}': {}", sheet, e))
    })?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| unique_headers(row.iter().enumerate().map(|(i, c)| header_name(c, i))))
        .unwrap_or_default();

    let records = rows
        .filter(|row| !row.iter().all(|c| matches!(c, Data::Empty)))
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row.get(i).map(cell_to_value).unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect::<Record>()
        })
        .collect();

    Ok(LoadedSheet {
        sheet_names,
        sheet,
        headers,
        records,
    })
}

pub struct ExcelConnector {
    id: String,
    name: String,
    config: Option<ExcelConfig>,
    loaded: LoadedSheet,
    connected: bool,
}

impl ExcelConnector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: None,
            loaded: LoadedSheet::default(),
            connected: false,
        }
    }

    /// Names of every sheet in the connected workbook.
    pub fn sheet_names(&self) -> ConnectorResult<&[String]> {
        self.ensure_connected()?;
        Ok(&self.loaded.sheet_names)
    }

    /// The sheet records were loaded from.
    pub fn active_sheet(&self) -> Option<&str> {
        self.connected.then_some(self.loaded.sheet.as_str())
    }
}

#[async_trait]
impl Connector for ExcelConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Excel
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self, config: &Value) -> ConnectorResult<()> {
        self.connected = false;
        let config: ExcelConfig = parse_config(ConnectorKind::Excel, config)?;
        self.config = Some(config.clone());

        let path = config.file_path.clone();
        let sheet_name = config.sheet_name.clone();
        let loaded = tokio::task::spawn_blocking(move || load_sheet(&path, sheet_name.as_deref()))
            .await
            .map_err(|e| {
                ConnectorError::connection(format!("workbook reader task failed: {}", e))
            })??;

        info!(
            "ExcelConnector '{}': loaded {} rows from sheet '{}' of {}",
            self.name,
            loaded.records.len(),
            loaded.sheet,
            config.file_path.display()
        );

        self.loaded = loaded;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.loaded = LoadedSheet::default();
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
        Ok(infer_schema(&self.loaded.headers, &self.loaded.records))
    }

    async fn preview(&self, limit: usize) -> ConnectorResult<Vec<Record>> {
        self.ensure_connected()?;
        Ok(preview_records(&self.loaded.records, limit))
    }

    async fn sync_into(
        &self,
        mapping: &[FieldMapping],
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<SyncResult> {
        self.ensure_connected()?;
        Ok(sync_records(&self.name, &self.loaded.records, mapping, sink))
    }
}
