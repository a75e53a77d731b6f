//! Records and JSON-lines decoding.
//!
//! A [`Record`] is one JSON object. No schema is enforced when decoding:
//! a record with a missing field only fails when that field is read.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConnectorError, Result};

/// One decoded record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a record from a decoded JSON value. Anything but an object is
    /// rejected; `location` names where the value came from.
    pub fn from_value(value: Value, location: &str) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ConnectorError::MalformedRecord {
                location: location.to_string(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    /// Decode a single JSON object from raw bytes.
    pub fn from_slice(bytes: &[u8], location: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ConnectorError::MalformedRecord {
                location: location.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_value(value, location)
    }

    /// Field by name, failing with [`ConnectorError::MissingField`] when absent.
    pub fn field(&self, name: &str) -> Result<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| ConnectorError::MissingField(name.to_string()))
    }

    /// String field by name.
    pub fn field_str(&self, name: &str) -> Result<&str> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| ConnectorError::MalformedRecord {
                location: format!("field '{}'", name),
                reason: "not a string".to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Deserialize the record into a typed struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(|e| {
            ConnectorError::MalformedRecord {
                location: "record".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode newline-delimited JSON into records.
///
/// Pure: no I/O, same bytes always give the same records. The final empty
/// line (a trailing newline) is skipped; every other line must hold exactly
/// one JSON object. `location` prefixes error locations, which carry the
/// 1-based line number.
pub fn decode_ndjson(bytes: &[u8], location: &str) -> Result<Vec<Record>> {
    let mut lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            Record::from_slice(line, &format!("{}:{}", location, i + 1))
        })
        .collect()
}

/// Infer an Arrow schema describing a set of records.
pub fn infer_schema(records: &[Record]) -> Result<SchemaRef> {
    let values = records
        .iter()
        .map(|r| Ok::<_, arrow::error::ArrowError>(Value::Object(r.as_map().clone())));
    let schema = arrow::json::reader::infer_json_schema_from_iterator(values)?;
    Ok(Arc::new(schema))
}
