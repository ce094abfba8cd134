//! Field-path resolution and record projection.

use std::str::FromStr;

use serde_json::{Number, Value};

use crate::error::MappingError;
use crate::model::{FieldMapping, Record};

/// Value conversions a mapping entry may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Trim,
    Uppercase,
    Lowercase,
    Number,
    String,
    Boolean,
}

impl FromStr for Transform {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trim" => Ok(Transform::Trim),
            "uppercase" | "upper" => Ok(Transform::Uppercase),
            "lowercase" | "lower" => Ok(Transform::Lowercase),
            "number" => Ok(Transform::Number),
            "string" => Ok(Transform::String),
            "boolean" | "bool" => Ok(Transform::Boolean),
            _ => Err(MappingError::UnknownTransform(s.to_string())),
        }
    }
}

impl Transform {
    fn name(&self) -> &'static str {
        match self {
            Transform::Trim => "trim",
            Transform::Uppercase => "uppercase",
            Transform::Lowercase => "lowercase",
            Transform::Number => "number",
            Transform::String => "string",
            Transform::Boolean => "boolean",
        }
    }

    /// Apply to one value. `null` always passes through unchanged.
    pub fn apply(&self, value: Value) -> Result<Value, MappingError> {
        if value.is_null() {
            return Ok(value);
        }
        match self {
            Transform::Trim => Ok(map_text(value, |s| s.trim().to_string())),
            Transform::Uppercase => Ok(map_text(value, |s| s.to_uppercase())),
            Transform::Lowercase => Ok(map_text(value, |s| s.to_lowercase())),
            Transform::String => Ok(match value {
                Value::String(_) => value,
                other => Value::String(other.to_string()),
            }),
            Transform::Number => match &value {
                Value::Number(_) => Ok(value),
                Value::String(s) => parse_number(s.trim()).ok_or_else(|| self.failed(&value)),
                _ => Err(self.failed(&value)),
            },
            Transform::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" => Ok(Value::Bool(false)),
                    _ => Err(self.failed(&value)),
                },
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f == 0.0 => Ok(Value::Bool(false)),
                    Some(f) if f == 1.0 => Ok(Value::Bool(true)),
                    _ => Err(self.failed(&value)),
                },
                _ => Err(self.failed(&value)),
            },
        }
    }

    fn failed(&self, value: &Value) -> MappingError {
        MappingError::TransformFailed {
            transform: self.name().to_string(),
            value: value.to_string(),
        }
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Look up a dot path (`a.b.0.c`) in a record.
///
/// A key that literally contains dots wins over path traversal. A missing
/// leaf resolves to `None`; a missing or scalar parent is an error.
pub fn resolve_path<'a>(record: &'a Record, path: &str) -> Result<Option<&'a Value>, MappingError> {
    if let Some(value) = record.get(path) {
        return Ok(Some(value));
    }

    let mut segments = path.split('.');
    let mut current = segments.next().and_then(|first| record.get(first));
    for segment in segments {
        current = match current {
            Some(Value::Object(map)) => map.get(segment),
            Some(Value::Array(items)) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => {
                return Err(MappingError::Unresolvable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };
    }
    Ok(current)
}

/// Project one record through `mappings`, in order. Later entries with the
/// same target overwrite earlier ones.
pub fn project_record(record: &Record, mappings: &[FieldMapping]) -> Result<Record, MappingError> {
    let mut out = Record::new();
    for mapping in mappings {
        let mut value = resolve_path(record, &mapping.source)?
            .cloned()
            .unwrap_or(Value::Null);
        if let Some(name) = &mapping.transform {
            value = name.parse::<Transform>()?.apply(value)?;
        }
        out.insert(mapping.target.clone(), value);
    }
    Ok(out)
}
