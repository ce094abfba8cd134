//! JSON Lines output for `pimflow sync --output`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pimflow_core::{Record, RecordSink};

/// Writes one JSON object per line. The first write error is kept and
/// reported by [`JsonLinesSink::finish`]; later records are dropped.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    written: usize,
    error: Option<std::io::Error>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
            error: None,
        })
    }

    fn write(&mut self, record: &Record) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }

    /// Flush and return the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        if let Some(e) = self.error.take() {
            return Err(e).context("Failed to write output");
        }
        self.writer.flush().context("Failed to flush output")?;
        Ok(self.written)
    }
}

impl RecordSink for JsonLinesSink {
    fn accept(&mut self, record: Record) {
        if self.error.is_some() {
            return;
        }
        match self.write(&record) {
            Ok(()) => self.written += 1,
            Err(e) => self.error = Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_writes_one_object_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.jsonl");

        let mut sink = JsonLinesSink::create(&path).unwrap();
        sink.accept(json!({ "sku": "A", "qty": 1 }).as_object().cloned().unwrap());
        sink.accept(json!({ "sku": "B", "qty": null }).as_object().cloned().unwrap());
        assert_eq!(sink.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(
            lines,
            vec![json!({ "sku": "A", "qty": 1 }), json!({ "sku": "B", "qty": null })]
        );
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(JsonLinesSink::create(&tmp.path().join("nope/out.jsonl")).is_err());
    }
}
