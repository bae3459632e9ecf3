//! Compact columnar JSON codec.
//!
//! Row-oriented records are turned into a shared header list plus positional
//! row arrays, so column names are sent once per payload instead of once per
//! row:
//!
//! ```text
//! {"h":["server","cpu"],"d":[["SRV-001",10.5],["SRV-002",20.1]],"c":2}
//! ```
//!
//! Temporal cells are lossy on the wire. The standard variant renders them as
//! ISO-8601 strings and decodes them back as text; the ultra variant renders
//! them as epoch seconds and decodes them back as integers. Callers must know
//! from the schema which columns were temporal.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

use crate::storage::{Record, Value};

/// Wire format for whole-second temporal cells in the standard variant.
pub const TEMPORAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Wire format for temporal cells with a sub-second part: always microseconds.
pub const TEMPORAL_MICROS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Metadata key whose integer value is carried on the wire as `c`.
pub const TOTAL_RECORDS_KEY: &str = "total_records";

/// Free-form payload metadata.
pub type Metadata = Map<String, JsonValue>;

/// Errors raised while encoding or decoding compact payloads.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// A record lacks a column present in the header list.
    #[error("record {row} is missing column '{column}'")]
    MissingColumn { row: usize, column: String },

    /// A record carries a column absent from the header list.
    #[error("record {row} has unexpected column '{column}'")]
    UnexpectedColumn { row: usize, column: String },

    /// A payload row does not have one cell per header.
    #[error("row {row} has {actual} cells, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// NaN and infinities have no JSON representation.
    #[error("column '{column}' holds a non-finite decimal")]
    NonFiniteDecimal { column: String },

    /// A payload cell is not a scalar this codec produces.
    #[error("column '{column}' holds unsupported value {value}")]
    UnsupportedValue { column: String, value: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Header list plus positional rows.
///
/// Only `h`, `d` and `c` appear on the wire; `metadata` is kept server side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactPayload {
    #[serde(rename = "h")]
    pub headers: Vec<String>,
    #[serde(rename = "d")]
    pub rows: Vec<Vec<JsonValue>>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip)]
    pub metadata: Metadata,
}

impl CompactPayload {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize to the wire form.
    pub fn to_json(&self) -> Result<String, EncodingError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the wire form. Metadata is empty after parsing.
    pub fn from_json(raw: &str) -> Result<Self, EncodingError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemporalMode {
    Iso,
    EpochSeconds,
}

/// Encode records into a compact payload.
///
/// Headers follow the key order of the first record; every record must carry
/// exactly those keys.
pub fn encode(records: &[Record], metadata: Option<Metadata>) -> Result<CompactPayload, EncodingError> {
    encode_with(records, metadata, TemporalMode::Iso)
}

/// Encode records with temporal cells as integer epoch seconds.
///
/// Naive timestamps are read as UTC.
pub fn encode_ultra(
    records: &[Record],
    metadata: Option<Metadata>,
) -> Result<CompactPayload, EncodingError> {
    encode_with(records, metadata, TemporalMode::EpochSeconds)
}

fn encode_with(
    records: &[Record],
    metadata: Option<Metadata>,
    mode: TemporalMode,
) -> Result<CompactPayload, EncodingError> {
    let metadata = metadata.unwrap_or_default();
    let count = metadata.get(TOTAL_RECORDS_KEY).and_then(JsonValue::as_u64);

    let Some(first) = records.first() else {
        return Ok(CompactPayload {
            count,
            metadata,
            ..Default::default()
        });
    };
    let headers: Vec<String> = first.keys().cloned().collect();

    let mut rows = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if record.len() != headers.len()
            && let Some(extra) = record.keys().find(|k| !first.contains_key(*k))
        {
            return Err(EncodingError::UnexpectedColumn {
                row: i,
                column: extra.clone(),
            });
        }

        let row = headers
            .iter()
            .map(|column| {
                let value = record
                    .get(column)
                    .ok_or_else(|| EncodingError::MissingColumn {
                        row: i,
                        column: column.clone(),
                    })?;
                encode_cell(column, value, mode)
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok(CompactPayload {
        headers,
        rows,
        count,
        metadata,
    })
}

fn encode_cell(column: &str, value: &Value, mode: TemporalMode) -> Result<JsonValue, EncodingError> {
    Ok(match value {
        Value::Text(v) => JsonValue::String(v.clone()),
        Value::Integer(v) => JsonValue::from(*v),
        Value::Decimal(v) => Number::from_f64(*v).map(JsonValue::Number).ok_or_else(|| {
            EncodingError::NonFiniteDecimal {
                column: column.to_string(),
            }
        })?,
        Value::Boolean(v) => JsonValue::Bool(*v),
        Value::Temporal(v) => encode_temporal(v, mode),
    })
}

fn encode_temporal(value: &NaiveDateTime, mode: TemporalMode) -> JsonValue {
    match mode {
        TemporalMode::Iso => JsonValue::String(format_temporal(value)),
        TemporalMode::EpochSeconds => JsonValue::from(value.and_utc().timestamp()),
    }
}

/// ISO-8601 text of a timestamp: no fraction for whole seconds, otherwise six
/// fractional digits.
pub fn format_temporal(value: &NaiveDateTime) -> String {
    let format = if value.nanosecond() == 0 {
        TEMPORAL_FORMAT
    } else {
        TEMPORAL_MICROS_FORMAT
    };
    value.format(format).to_string()
}

/// Rebuild records from a payload.
///
/// Every row must have exactly one cell per header.
pub fn decode(payload: &CompactPayload) -> Result<Vec<Record>, EncodingError> {
    payload
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() != payload.headers.len() {
                return Err(EncodingError::RowLength {
                    row: i,
                    expected: payload.headers.len(),
                    actual: row.len(),
                });
            }
            payload
                .headers
                .iter()
                .zip(row)
                .map(|(column, cell)| decode_cell(column, cell).map(|v| (column.clone(), v)))
                .collect::<Result<Record, EncodingError>>()
        })
        .collect()
}

fn decode_cell(column: &str, cell: &JsonValue) -> Result<Value, EncodingError> {
    match cell {
        JsonValue::String(v) => Ok(Value::Text(v.clone())),
        JsonValue::Bool(v) => Ok(Value::Boolean(*v)),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(v), _) => Ok(Value::Integer(v)),
            (None, Some(v)) => Ok(Value::Decimal(v)),
            (None, None) => Err(unsupported(column, cell)),
        },
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => {
            Err(unsupported(column, cell))
        }
    }
}

fn unsupported(column: &str, cell: &JsonValue) -> EncodingError {
    EncodingError::UnsupportedValue {
        column: column.to_string(),
        value: cell.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn total(n: u64) -> Option<Metadata> {
        json!({ "total_records": n, "generated_by": "test" })
            .as_object()
            .cloned()
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_encode_exact_wire_form() {
        let records = vec![
            record(&[("server", "SRV-001".into()), ("cpu", 10.5.into())]),
            record(&[("server", "SRV-002".into()), ("cpu", 20.1.into())]),
        ];

        let payload = encode(&records, total(2)).unwrap();
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"h":["server","cpu"],"d":[["SRV-001",10.5],["SRV-002",20.1]],"c":2}"#
        );
        // Other metadata stays server side
        assert_eq!(payload.metadata["generated_by"], "test");
    }

    #[test]
    fn test_count_omitted_without_total_records() {
        let records = vec![record(&[("a", 1_i64.into())])];
        let payload = encode(&records, None).unwrap();
        assert_eq!(payload.to_json().unwrap(), r#"{"h":["a"],"d":[[1]]}"#);
    }

    #[test]
    fn test_missing_column_fails() {
        let records = vec![
            record(&[("a", 1_i64.into()), ("b", 2_i64.into())]),
            record(&[("a", 3_i64.into())]),
        ];

        let err = encode(&records, None).unwrap_err();
        assert!(matches!(
            err,
            EncodingError::MissingColumn { row: 1, ref column } if column == "b"
        ));
    }

    #[test]
    fn test_unexpected_column_fails() {
        let records = vec![
            record(&[("a", 1_i64.into())]),
            record(&[("a", 3_i64.into()), ("z", 4_i64.into())]),
        ];
        assert!(matches!(
            encode(&records, None),
            Err(EncodingError::UnexpectedColumn { row: 1, .. })
        ));
    }

    #[test]
    fn test_key_order_may_differ_between_records() {
        let records = vec![
            record(&[("a", 1_i64.into()), ("b", true.into())]),
            record(&[("b", false.into()), ("a", 2_i64.into())]),
        ];
        let payload = encode(&records, None).unwrap();
        assert_eq!(payload.rows[1], vec![json!(2), json!(false)]);
    }

    #[test]
    fn test_non_finite_decimal_fails() {
        let records = vec![record(&[("cpu", f64::NAN.into())])];
        assert!(matches!(
            encode(&records, None),
            Err(EncodingError::NonFiniteDecimal { .. })
        ));
    }

    #[test]
    fn test_roundtrip_scalar_columns() {
        let records = vec![
            record(&[
                ("server", "SRV-001".into()),
                ("sessions", 42_i64.into()),
                ("cpu", 20.0.into()),
                ("online", true.into()),
            ]),
            record(&[
                ("server", "SRV-002".into()),
                ("sessions", (-1_i64).into()),
                ("cpu", 0.25.into()),
                ("online", false.into()),
            ]),
        ];

        let wire = encode(&records, None).unwrap().to_json().unwrap();
        let decoded = decode(&CompactPayload::from_json(&wire).unwrap()).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_temporal_degrades_to_text() {
        let records = vec![record(&[("timestamp", ts().into())])];
        let decoded = decode(&encode(&records, None).unwrap()).unwrap();
        assert_eq!(decoded[0]["timestamp"], Value::from("2025-01-01T06:00:00"));

        let precise = ts() + chrono::Duration::microseconds(250_000);
        let payload = encode(&[record(&[("timestamp", precise.into())])], None).unwrap();
        assert_eq!(payload.rows[0][0], json!("2025-01-01T06:00:00.250000"));

        let micros = ts() + chrono::Duration::microseconds(7);
        assert_eq!(format_temporal(&micros), "2025-01-01T06:00:00.000007");
        assert_eq!(format_temporal(&ts()), "2025-01-01T06:00:00");
    }

    #[test]
    fn test_ultra_rewrites_temporal_to_epoch_seconds() {
        let records = vec![record(&[
            ("timestamp", ts().into()),
            ("server", "SRV-001".into()),
        ])];

        let payload = encode_ultra(&records, total(1)).unwrap();
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"h":["timestamp","server"],"d":[[1735711200,"SRV-001"]],"c":1}"#
        );
        // Indistinguishable from an integer column once decoded
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded[0]["timestamp"], Value::Integer(1_735_711_200));
    }

    #[test]
    fn test_decode_rejects_row_length_mismatch() {
        let payload = CompactPayload::from_json(r#"{"h":["a","b"],"d":[[1,2],[3]]}"#).unwrap();
        assert!(matches!(
            decode(&payload),
            Err(EncodingError::RowLength {
                row: 1,
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_decode_rejects_null_and_nested() {
        let payload = CompactPayload::from_json(r#"{"h":["a"],"d":[[null]]}"#).unwrap();
        assert!(matches!(
            decode(&payload),
            Err(EncodingError::UnsupportedValue { .. })
        ));

        let payload = CompactPayload::from_json(r#"{"h":["a"],"d":[[[1]]]}"#).unwrap();
        assert!(decode(&payload).is_err());
    }

    #[test]
    fn test_empty_input() {
        let payload = encode(&[], total(0)).unwrap();
        assert!(payload.is_empty());
        assert_eq!(payload.to_json().unwrap(), r#"{"h":[],"d":[],"c":0}"#);
        assert!(decode(&payload).unwrap().is_empty());
    }
}
