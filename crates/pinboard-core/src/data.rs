//! In-memory payload handles.
//!
//! A payload is either tabular (a [`DataFrame`]) or opaque (any JSON-shaped
//! value). The distinction is made at runtime by [`Payload::capability`];
//! format dispatch in the adaptor module keys off it.

use crate::error::{PinboardError, Result};
use serde_json::Value;

/// What a payload's shape permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Exposes rows, columns and a shape.
    Tabular,
    /// Anything else; only generic formats apply.
    Opaque,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tabular => "tabular",
            Capability::Opaque => "opaque",
        }
    }
}

/// An in-memory payload to be pinned or returned from a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Table(DataFrame),
    Object(Value),
}

impl Payload {
    /// Classify the payload by its runtime shape.
    pub fn capability(&self) -> Capability {
        match self {
            Payload::Table(_) => Capability::Tabular,
            Payload::Object(_) => Capability::Opaque,
        }
    }
}

impl From<DataFrame> for Payload {
    fn from(df: DataFrame) -> Self {
        Payload::Table(df)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Object(value)
    }
}

/// Runtime kind name of an opaque value, used in default pin titles.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// A small row-major table with named columns.
///
/// Cells hold JSON values so the table can round-trip through every
/// serialization format without a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Build from column names and row-major data. Every row must have one
    /// cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PinboardError::Other(format!(
                    "Row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (name, values) in &columns {
            if values.len() != n_rows {
                return Err(PinboardError::Other(format!(
                    "Column '{}' has {} values, expected {}",
                    name,
                    values.len(),
                    n_rows
                )));
            }
        }

        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let mut rows = vec![Vec::with_capacity(names.len()); n_rows];
        for (_, values) in columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Ok(Self {
            columns: names,
            rows,
        })
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> DataFrame {
        DataFrame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Rows as `{column -> value}` maps, column order preserved.
    pub fn records(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Rebuild from record maps. Column order is taken from the first record.
    pub fn from_records(records: Vec<serde_json::Map<String, Value>>) -> Result<Self> {
        let columns: Vec<String> = match records.first() {
            Some(first) => first.keys().cloned().collect(),
            None => Vec::new(),
        };

        let mut rows = Vec::with_capacity(records.len());
        for mut record in records {
            let mut row = Vec::with_capacity(columns.len());
            for column in &columns {
                let cell = record.remove(column).ok_or_else(|| {
                    PinboardError::Other(format!("Record missing column '{}'", column))
                })?;
                row.push(cell);
            }
            rows.push(row);
        }

        Self::new(columns, rows)
    }

    // CSV rendering ---------------------------------------------------------

    /// Render as row-oriented text: header line then one line per row,
    /// trailing newline included.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_csv_row(&mut out, self.columns.iter().map(String::as_str));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(csv_cell).collect();
            push_csv_row(&mut out, cells.iter().map(String::as_str));
        }
        out
    }

    /// Parse row-oriented text produced by [`to_csv`](Self::to_csv) or a
    /// compatible writer. Numeric-looking cells come back as numbers.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut lines = parse_csv(text)?;
        if lines.is_empty() {
            return Ok(Self {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }
        let columns = lines.remove(0);
        let rows: Vec<Vec<Value>> = lines
            .into_iter()
            .map(|cells| cells.iter().map(|c| parse_csv_cell(c)).collect())
            .collect();
        Self::new(columns, rows)
    }
}

fn push_csv_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Nested structures are rare in tabular data; embed them as JSON text.
        other => other.to_string(),
    }
}

fn parse_csv_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if cell == "true" {
        return Value::Bool(true);
    }
    if cell == "false" {
        return Value::Bool(false);
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = cell.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}

/// Minimal CSV reader: handles quoted cells, doubled quotes and CRLF.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        cell.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut cell));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            _ => cell.push(c),
        }
    }

    if in_quotes {
        return Err(PinboardError::Decode {
            format: "csv".to_string(),
            message: "unterminated quoted cell".to_string(),
        });
    }
    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }

    Ok(records)
}
