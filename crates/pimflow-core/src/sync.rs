//! Per-sync bookkeeping and record sinks.

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::model::{Record, SyncError, SyncResult};

/// Receives projected records during a sync, in load order.
pub trait RecordSink: Send {
    fn accept(&mut self, record: Record);
}

impl RecordSink for Vec<Record> {
    fn accept(&mut self, record: Record) {
        self.push(record);
    }
}

/// Sink that drops everything; backs the plain `sync()` call.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl RecordSink for DiscardSink {
    fn accept(&mut self, _record: Record) {}
}

/// Accumulates counts while a sync walks its records and freezes them into
/// a [`SyncResult`] at the end.
#[derive(Debug)]
pub struct SyncTracker {
    started: Instant,
    timestamp: DateTime<Utc>,
    processed: usize,
    created: usize,
    updated: usize,
    errors: Vec<SyncError>,
}

impl SyncTracker {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            timestamp: Utc::now(),
            processed: 0,
            created: 0,
            updated: 0,
            errors: Vec::new(),
        }
    }

    pub fn created(&mut self) {
        self.processed += 1;
        self.created += 1;
    }

    pub fn updated(&mut self) {
        self.processed += 1;
        self.updated += 1;
    }

    pub fn failed(&mut self, error: SyncError) {
        self.processed += 1;
        self.errors.push(error);
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn finish(self) -> SyncResult {
        let records_failed = self.errors.len();
        SyncResult {
            success: records_failed == 0,
            records_processed: self.processed,
            records_created: self.created,
            records_updated: self.updated,
            records_failed,
            errors: self.errors,
            duration: self.started.elapsed().as_millis() as u64,
            timestamp: self.timestamp,
        }
    }
}
