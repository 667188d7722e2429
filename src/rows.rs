use std::io::Read;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

/// A scalar cell in an input row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(Number),
    Text(String),
}

impl CellValue {
    /// Wire representation: null becomes an empty string, numbers pass
    /// through, text stays text.
    pub fn to_wire(&self) -> Value {
        match self {
            CellValue::Null => Value::String(String::new()),
            CellValue::Number(n) => Value::Number(n.clone()),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        // NaN and infinities have no JSON form; treat them as missing.
        Number::from_f64(v).map_or(CellValue::Null, CellValue::Number)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Number(v.into())
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Null, Into::into)
    }
}

impl From<Value> for CellValue {
    /// Lossy: anything that is not null, a number or a string is kept as its
    /// JSON text.
    fn from(v: Value) -> Self {
        match v {
            Value::Null => CellValue::Null,
            Value::Number(n) => CellValue::Number(n),
            Value::String(s) => CellValue::Text(s),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// One row of input, columns in the order they were added.
///
/// Column names are not checked against the remote table; the remote API
/// decides what to do with unknown fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRow {
    cells: Vec<(String, CellValue)>,
}

impl InputRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`InputRow::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing the value in place if the column exists.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Convert to the `fields` object sent to the batch create endpoint.
    pub fn to_wire_fields(&self) -> Map<String, Value> {
        self.cells
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for InputRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = InputRow::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl TryFrom<Value> for InputRow {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(Error::InvalidInput(format!(
                "expected a JSON object per row, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// Parse a JSON records document: an array of objects, one per row.
pub fn parse_rows(json: &str) -> Result<Vec<InputRow>> {
    rows_from_value(serde_json::from_str(json)?)
}

/// Read a JSON records document from any reader (a file, stdin).
pub fn read_rows(reader: impl Read) -> Result<Vec<InputRow>> {
    rows_from_value(serde_json::from_reader(reader)?)
}

/// Load a JSON records file.
pub fn load_rows(path: impl AsRef<Path>) -> Result<Vec<InputRow>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_rows(std::io::BufReader::new(file))
}

fn rows_from_value(value: Value) -> Result<Vec<InputRow>> {
    let Value::Array(items) = value else {
        return Err(Error::InvalidInput(format!(
            "expected a JSON array of row objects, got {}",
            json_type_name(&value)
        )));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            InputRow::try_from(item).map_err(|e| Error::InvalidInput(format!("row {i}: {e}")))
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
