//! Payload serialization, previews and default titles.
//!
//! An [`Adaptor`] wraps one in-memory payload for the duration of a write or
//! preview call. Formats are dispatched on `(capability, format)`: tabular
//! payloads support every format, opaque payloads only the generic ones.
//! All operations are pure given the payload and format.

use crate::data::{value_kind, Capability, DataFrame, Payload};
use crate::error::{PinboardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows embedded in a tabular preview.
const PREVIEW_ROWS: usize = 10;

/// Serialization formats for pin data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Row-oriented text.
    Csv,
    /// Structured snapshot (JSON); records for tabular payloads.
    Json,
    /// Record-oriented binary (MessagePack record maps).
    Records,
    /// Columnar binary (MessagePack column vectors).
    Columnar,
    /// Generic object binary. Reading requires `allow_blob_read`.
    Blob,
}

impl Format {
    /// Wire tag stored in the manifest and used as the file extension.
    pub fn tag(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Records => "records",
            Format::Columnar => "columnar",
            Format::Blob => "blob",
        }
    }

    /// Parse a manifest tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "csv" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            "records" => Ok(Format::Records),
            "columnar" => Ok(Format::Columnar),
            "blob" => Ok(Format::Blob),
            other => Err(PinboardError::UnknownFormat {
                tag: other.to_string(),
            }),
        }
    }

    /// Whether a payload with `capability` can be written in this format.
    pub fn supports(&self, capability: Capability) -> bool {
        match self {
            Format::Json | Format::Blob => true,
            Format::Csv | Format::Records | Format::Columnar => {
                capability == Capability::Tabular
            }
        }
    }

    /// Default format for a payload capability.
    pub fn default_for(capability: Capability) -> Self {
        match capability {
            Capability::Tabular => Format::Csv,
            Capability::Opaque => Format::Json,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Per-column descriptor stored in the manifest and embedded in previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Display label; currently always the column name.
    pub label: String,
    /// Alignment hint for UIs: "right" for numeric columns, "left" otherwise.
    pub align: String,
    /// Type hint: "number", "string", "boolean" or "unknown".
    #[serde(rename = "type")]
    pub type_hint: String,
}

/// Column-major on-disk shape for [`Format::Columnar`].
#[derive(Debug, Serialize, Deserialize)]
struct ColumnarTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

/// On-disk shape for [`Format::Blob`]; keeps enough structure to restore the
/// payload variant on read.
#[derive(Debug, Serialize, Deserialize)]
enum BlobEnvelope {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Object(Value),
}

/// Ephemeral wrapper around one payload for a write/preview call.
pub struct Adaptor<'a> {
    payload: &'a Payload,
}

impl<'a> Adaptor<'a> {
    /// Classify and wrap a payload.
    pub fn wrap(payload: &'a Payload) -> Self {
        Self { payload }
    }

    pub fn capability(&self) -> Capability {
        self.payload.capability()
    }

    /// Serialize the payload in `format`.
    ///
    /// Fails with [`PinboardError::UnsupportedFormat`] when the format needs
    /// a tabular payload and this one is opaque.
    pub fn serialize(&self, format: Format) -> Result<Vec<u8>> {
        let capability = self.capability();
        if !format.supports(capability) {
            return Err(PinboardError::UnsupportedFormat {
                format: format.tag().to_string(),
                capability: capability.as_str().to_string(),
            });
        }

        match (self.payload, format) {
            (Payload::Table(df), Format::Csv) => Ok(df.to_csv().into_bytes()),
            (Payload::Table(df), Format::Json) => Ok(serde_json::to_vec(&df.records())?),
            (Payload::Table(df), Format::Records) => {
                rmp_serde::to_vec(&df.records()).map_err(encode_err(format))
            }
            (Payload::Table(df), Format::Columnar) => {
                let table = ColumnarTable {
                    columns: df.columns().to_vec(),
                    data: columnize(df),
                };
                rmp_serde::to_vec(&table).map_err(encode_err(format))
            }
            (Payload::Table(df), Format::Blob) => {
                let envelope = BlobEnvelope::Table {
                    columns: df.columns().to_vec(),
                    rows: df.rows().to_vec(),
                };
                rmp_serde::to_vec(&envelope).map_err(encode_err(format))
            }
            (Payload::Object(value), Format::Json) => Ok(serde_json::to_vec(value)?),
            (Payload::Object(value), Format::Blob) => {
                rmp_serde::to_vec(&BlobEnvelope::Object(value.clone()))
                    .map_err(encode_err(format))
            }
            // Unreachable: supports() already rejected these pairs.
            (Payload::Object(_), _) => unreachable!("rejected by supports()"),
        }
    }

    /// Bounded, deterministic preview of the payload.
    ///
    /// Tabular: a JSON document embedding the head rows and per-column
    /// descriptors. Opaque: the fixed empty-structure marker `"{}"`. The
    /// shape is part of the stored metadata contract; downstream UIs parse it.
    pub fn preview(&self) -> String {
        match self.payload {
            Payload::Object(_) => "{}".to_string(),
            Payload::Table(df) => {
                let head = df.head(PREVIEW_ROWS);
                let preview = serde_json::json!({
                    "data": head.records(),
                    "columns": column_specs(df),
                });
                preview.to_string()
            }
        }
    }

    /// Default title for a pin holding this payload.
    ///
    /// The literal "DataFrame" label is a compatibility keyword read by other
    /// implementations; keep it verbatim.
    pub fn default_title(&self, name: &str) -> String {
        match self.payload {
            Payload::Table(df) => {
                let (rows, cols) = df.shape();
                format!("{name}: a pinned {rows} x {cols} DataFrame")
            }
            Payload::Object(value) => {
                format!("{name}: a pinned {} object", value_kind(value))
            }
        }
    }

    /// Column descriptors for the manifest; `None` for opaque payloads.
    pub fn column_specs(&self) -> Option<Vec<ColumnSpec>> {
        match self.payload {
            Payload::Table(df) => Some(column_specs(df)),
            Payload::Object(_) => None,
        }
    }
}

/// Decode stored bytes back into a payload.
///
/// `columns` is the manifest's column list; when present it tells us a
/// JSON snapshot was written from a tabular payload and fixes the column
/// order on reconstruction.
pub fn read_payload(format: Format, bytes: &[u8], columns: Option<&[String]>) -> Result<Payload> {
    match format {
        Format::Csv => {
            let text = std::str::from_utf8(bytes).map_err(|e| PinboardError::Decode {
                format: format.tag().to_string(),
                message: e.to_string(),
            })?;
            Ok(Payload::Table(DataFrame::from_csv(text)?))
        }
        Format::Json => {
            let value: Value = serde_json::from_slice(bytes)?;
            match columns {
                Some(cols) => records_to_table(value, cols),
                None => Ok(Payload::Object(value)),
            }
        }
        Format::Records => {
            let records: Vec<serde_json::Map<String, Value>> =
                rmp_serde::from_slice(bytes).map_err(decode_err(format))?;
            Ok(Payload::Table(DataFrame::from_records(records)?))
        }
        Format::Columnar => {
            let table: ColumnarTable = rmp_serde::from_slice(bytes).map_err(decode_err(format))?;
            let df = DataFrame::from_columns(
                table.columns.into_iter().zip(table.data).collect(),
            )?;
            Ok(Payload::Table(df))
        }
        Format::Blob => {
            let envelope: BlobEnvelope =
                rmp_serde::from_slice(bytes).map_err(decode_err(format))?;
            match envelope {
                BlobEnvelope::Table { columns, rows } => {
                    Ok(Payload::Table(DataFrame::new(columns, rows)?))
                }
                BlobEnvelope::Object(value) => Ok(Payload::Object(value)),
            }
        }
    }
}

fn records_to_table(value: Value, columns: &[String]) -> Result<Payload> {
    let records = match value {
        Value::Array(items) => items,
        other => {
            return Err(PinboardError::Decode {
                format: "json".to_string(),
                message: format!("expected a record list, got {}", value_kind(&other)),
            })
        }
    };

    let mut rows = Vec::with_capacity(records.len());
    for item in records {
        let mut map = match item {
            Value::Object(map) => map,
            other => {
                return Err(PinboardError::Decode {
                    format: "json".to_string(),
                    message: format!("expected a record map, got {}", value_kind(&other)),
                })
            }
        };
        let mut row = Vec::with_capacity(columns.len());
        for column in columns {
            row.push(map.remove(column).unwrap_or(Value::Null));
        }
        rows.push(row);
    }

    Ok(Payload::Table(DataFrame::new(columns.to_vec(), rows)?))
}

fn columnize(df: &DataFrame) -> Vec<Vec<Value>> {
    let (n_rows, n_cols) = df.shape();
    let mut data = vec![Vec::with_capacity(n_rows); n_cols];
    for row in df.rows() {
        for (col, cell) in data.iter_mut().zip(row) {
            col.push(cell.clone());
        }
    }
    data
}

fn column_specs(df: &DataFrame) -> Vec<ColumnSpec> {
    df.columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let type_hint = df
                .rows()
                .iter()
                .map(|row| &row[i])
                .find(|v| !v.is_null())
                .map(|v| match v {
                    Value::Number(_) => "number",
                    Value::String(_) => "string",
                    Value::Bool(_) => "boolean",
                    _ => "unknown",
                })
                .unwrap_or("unknown");
            ColumnSpec {
                name: name.clone(),
                label: name.clone(),
                align: if type_hint == "number" { "right" } else { "left" }.to_string(),
                type_hint: type_hint.to_string(),
            }
        })
        .collect()
}

fn encode_err(format: Format) -> impl Fn(rmp_serde::encode::Error) -> PinboardError {
    move |e| PinboardError::Decode {
        format: format.tag().to_string(),
        message: format!("encode failed: {e}"),
    }
}

fn decode_err(format: Format) -> impl Fn(rmp_serde::decode::Error) -> PinboardError {
    move |e| PinboardError::Decode {
        format: format.tag().to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_df() -> DataFrame {
        DataFrame::from_columns(vec![
            ("a".to_string(), vec![json!(1), json!(2), json!(3)]),
            ("b".to_string(), vec![json!(4), json!(5), json!(6)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_format_tag_roundtrip() {
        for format in [
            Format::Csv,
            Format::Json,
            Format::Records,
            Format::Columnar,
            Format::Blob,
        ] {
            assert_eq!(Format::from_tag(format.tag()).unwrap(), format);
        }
        assert!(Format::from_tag("feather").is_err());
    }

    #[test]
    fn test_default_formats() {
        assert_eq!(Format::default_for(Capability::Tabular), Format::Csv);
        assert_eq!(Format::default_for(Capability::Opaque), Format::Json);
    }

    #[test]
    fn test_csv_bytes_match_expected() {
        let payload = Payload::Table(sample_df());
        let bytes = Adaptor::wrap(&payload).serialize(Format::Csv).unwrap();
        assert_eq!(bytes, b"a,b\n1,4\n2,5\n3,6\n");
    }

    #[test]
    fn test_tabular_roundtrip_all_formats() {
        let df = sample_df();
        let payload = Payload::Table(df.clone());
        let adaptor = Adaptor::wrap(&payload);
        let columns: Vec<String> = df.columns().to_vec();

        for format in [
            Format::Csv,
            Format::Json,
            Format::Records,
            Format::Columnar,
            Format::Blob,
        ] {
            let bytes = adaptor.serialize(format).unwrap();
            let back = read_payload(format, &bytes, Some(&columns)).unwrap();
            assert_eq!(back, payload, "format {format}");
        }
    }

    #[test]
    fn test_opaque_roundtrip_generic_formats() {
        let payload = Payload::Object(json!({"a": [1, 2], "b": "text"}));
        let adaptor = Adaptor::wrap(&payload);

        for format in [Format::Json, Format::Blob] {
            let bytes = adaptor.serialize(format).unwrap();
            let back = read_payload(format, &bytes, None).unwrap();
            assert_eq!(back, payload, "format {format}");
        }
    }

    #[test]
    fn test_opaque_rejects_tabular_formats() {
        let payload = Payload::Object(json!([1, 2, 3]));
        let adaptor = Adaptor::wrap(&payload);

        for format in [Format::Csv, Format::Records, Format::Columnar] {
            let err = adaptor.serialize(format).unwrap_err();
            assert!(
                matches!(err, PinboardError::UnsupportedFormat { .. }),
                "format {format}"
            );
        }
    }

    #[test]
    fn test_default_title_tabular() {
        let payload = Payload::Table(sample_df());
        assert_eq!(
            Adaptor::wrap(&payload).default_title("df_csv"),
            "df_csv: a pinned 3 x 2 DataFrame"
        );
    }

    #[test]
    fn test_default_title_opaque() {
        let cases = [
            (json!(42), "x: a pinned int object"),
            (json!(1.5), "x: a pinned float object"),
            (json!([1, 2, 3]), "x: a pinned list object"),
            (json!({"a": 1}), "x: a pinned dict object"),
        ];
        for (value, expected) in cases {
            let payload = Payload::Object(value);
            assert_eq!(Adaptor::wrap(&payload).default_title("x"), expected);
        }
    }

    #[test]
    fn test_opaque_preview_is_empty_marker() {
        let payload = Payload::Object(json!(42));
        assert_eq!(Adaptor::wrap(&payload).preview(), "{}");
    }

    #[test]
    fn test_tabular_preview_shape() {
        let payload = Payload::Table(sample_df());
        let preview: Value =
            serde_json::from_str(&Adaptor::wrap(&payload).preview()).unwrap();

        let data = preview["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0], json!({"a": 1, "b": 4}));

        let columns = preview["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0]["name"], "a");
        assert_eq!(columns[0]["align"], "right");
        assert_eq!(columns[0]["type"], "number");
    }

    #[test]
    fn test_tabular_preview_is_bounded() {
        let rows: Vec<Value> = (0..100).map(|i| json!(i)).collect();
        let df = DataFrame::from_columns(vec![("n".to_string(), rows)]).unwrap();
        let payload = Payload::Table(df);

        let preview: Value =
            serde_json::from_str(&Adaptor::wrap(&payload).preview()).unwrap();
        assert_eq!(preview["data"].as_array().unwrap().len(), PREVIEW_ROWS);
    }

    #[test]
    fn test_preview_deterministic() {
        let payload = Payload::Table(sample_df());
        assert_eq!(
            Adaptor::wrap(&payload).preview(),
            Adaptor::wrap(&payload).preview()
        );
    }

    #[test]
    fn test_column_specs_type_hints() {
        let df = DataFrame::from_columns(vec![
            ("n".to_string(), vec![json!(1)]),
            ("s".to_string(), vec![json!("x")]),
            ("f".to_string(), vec![json!(true)]),
            ("e".to_string(), vec![Value::Null]),
        ])
        .unwrap();
        let payload = Payload::Table(df);
        let specs = Adaptor::wrap(&payload).column_specs().unwrap();

        assert_eq!(specs[0].type_hint, "number");
        assert_eq!(specs[1].type_hint, "string");
        assert_eq!(specs[2].type_hint, "boolean");
        assert_eq!(specs[3].type_hint, "unknown");
        assert_eq!(specs[0].align, "right");
        assert_eq!(specs[1].align, "left");
    }

    #[test]
    fn test_json_read_with_columns_restores_table() {
        let df = sample_df();
        let payload = Payload::Table(df.clone());
        let bytes = Adaptor::wrap(&payload).serialize(Format::Json).unwrap();

        // Without the column hint the snapshot reads back as a plain value.
        let plain = read_payload(Format::Json, &bytes, None).unwrap();
        assert!(matches!(plain, Payload::Object(_)));

        // With the hint it reconstructs the frame, column order included.
        let cols: Vec<String> = df.columns().to_vec();
        let table = read_payload(Format::Json, &bytes, Some(&cols)).unwrap();
        assert_eq!(table, payload);
    }
}
