//! Helpers for connectors that hold their whole dataset in memory.

use std::collections::HashSet;

use pimflow_core::{
    project_record, FieldMapping, Record, RecordSink, SyncError, SyncResult, SyncTracker,
};
use serde_json::Value;
use tracing::{debug, info};

/// Walk `records` in load order and project each through `mapping`.
///
/// `SyncError.row` is the zero-based index into `records`.
pub fn sync_records(
    connector_name: &str,
    records: &[Record],
    mapping: &[FieldMapping],
    sink: &mut dyn RecordSink,
) -> SyncResult {
    let mut tracker = SyncTracker::start();

    for (row, record) in records.iter().enumerate() {
        match project_record(record, mapping) {
            Ok(projected) => {
                sink.accept(projected);
                tracker.created();
            }
            Err(e) => {
                debug!("{}: row {} failed: {}", connector_name, row, e);
                let error = SyncError::for_row(row, e.to_string());
                tracker.failed(error.with_data(Value::Object(record.clone())));
            }
        }
    }

    let result = tracker.finish();
    info!(
        "{}: synced {} records ({} created, {} failed) in {}ms",
        connector_name,
        result.records_processed,
        result.records_created,
        result.records_failed,
        result.duration
    );
    result
}

pub fn preview_records(records: &[Record], limit: usize) -> Vec<Record> {
    records.iter().take(limit).cloned().collect()
}

/// Make header names distinct so no column overwrites another in a record.
///
/// A repeated name gets the first free `_2`, `_3`, ... suffix.
pub fn unique_headers<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let names: Vec<String> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut headers = Vec::with_capacity(names.len());
    for name in names {
        let mut unique = name.clone();
        let mut n = 2;
        while taken.contains(&unique) {
            unique = format!("{}_{}", name, n);
            n += 1;
        }
        taken.insert(unique.clone());
        headers.push(unique);
    }
    headers
}
