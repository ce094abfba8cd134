//! Schema inference from loaded records.
//!
//! Every connector goes through [`infer_type`] so that the same sample value
//! produces the same type tag regardless of where it was read from.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::model::{FieldType, Record, Schema, SchemaField};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Classify one sample value.
///
/// Precedence: missing -> string, array, object, number, boolean, date,
/// string. Text values are checked for number/boolean/date shapes; native
/// JSON numbers and booleans short-circuit.
pub fn infer_type(value: Option<&Value>) -> FieldType {
    match value {
        None | Some(Value::Null) => FieldType::String,
        Some(Value::Array(_)) => FieldType::Array,
        Some(Value::Object(_)) => FieldType::Object,
        Some(Value::Number(_)) => FieldType::Number,
        Some(Value::Bool(_)) => FieldType::Boolean,
        Some(Value::String(s)) => infer_text_type(s),
    }
}

fn infer_text_type(text: &str) -> FieldType {
    if is_numeric(text) {
        FieldType::Number
    } else if text == "true" || text == "false" {
        FieldType::Boolean
    } else if is_date(text) {
        FieldType::Date
    } else {
        FieldType::String
    }
}

/// Non-empty text that parses as a finite number.
pub fn is_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Text that parses as a calendar date or timestamp.
pub fn is_date(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    DateTime::parse_from_rfc3339(trimmed).is_ok()
        || DATE_FORMATS
            .iter()
            .any(|fmt| NaiveDate::parse_from_str(trimmed, fmt).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).is_ok())
}

/// Missing, null, or blank text.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Build a schema for `field_names`: the type comes from the first record,
/// `nullable` from a scan over all records.
pub fn infer_schema(field_names: &[String], records: &[Record]) -> Schema {
    let first = records.first();
    let fields = field_names
        .iter()
        .map(|name| {
            let sample = first.and_then(|r| r.get(name));
            let nullable = records.iter().any(|r| is_empty_value(r.get(name)));
            SchemaField {
                name: name.clone(),
                field_type: infer_type(sample),
                nullable,
                sample: sample.cloned(),
            }
        })
        .collect();
    Schema::new(fields)
}

/// Schema keyed on the first record's own fields.
pub fn infer_schema_from_first(records: &[Record]) -> Schema {
    let names: Vec<String> = records
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    infer_schema(&names, records)
}
