//! Core data types for the storage layer.
//!
//! This module defines the row model shared by the query builder, the data
//! store and the columnar codec:
//!
//! - [`Value`]: A typed scalar cell (text, integer, decimal, boolean, temporal)
//! - [`ColumnType`]: The declared type of a table column
//! - [`Record`]: One row, as an insertion-ordered column → value map
//! - [`FilterSpec`]: Column → equality / membership conditions for a `WHERE` clause

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// A single row keyed by column name.
///
/// Key order is significant: the codec derives its header list from the
/// first record's key order.
pub type Record = IndexMap<String, Value>;

/// Caller-supplied filters, applied in insertion order.
pub type FilterSpec = IndexMap<String, FilterValue>;

/// A typed scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Free-form text (`VARCHAR`).
    Text(String),
    /// Signed integer (`INTEGER`).
    Integer(i64),
    /// Fixed-precision decimal, carried as a float (`DECIMAL`).
    Decimal(f64),
    /// Boolean flag (`BOOLEAN`).
    Boolean(bool),
    /// Timestamp without timezone (`TIMESTAMP`), interpreted as UTC.
    Temporal(NaiveDateTime),
}

impl Value {
    /// The column type this value would infer.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Text(_) => ColumnType::Text,
            Self::Integer(_) => ColumnType::Integer,
            Self::Decimal(_) => ColumnType::Decimal,
            Self::Boolean(_) => ColumnType::Boolean,
            Self::Temporal(_) => ColumnType::Temporal,
        }
    }

    /// Coerce a raw query-string value into a typed scalar.
    ///
    /// `true`/`false` (any case) become booleans, all-digit strings become
    /// integers, digit strings with dots become decimals, everything else
    /// stays text.
    pub fn coerce(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower == "true" || lower == "false" {
            return Self::Boolean(lower == "true");
        }

        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<i64>() {
                return Self::Integer(n);
            }
        }

        let has_digit = raw.bytes().any(|b| b.is_ascii_digit());
        if has_digit && raw.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            if let Ok(f) = raw.parse::<f64>() {
                return Self::Decimal(f);
            }
        }

        Self::Text(raw.to_string())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Temporal(v)
    }
}

/// Plain JSON rendering used by the full-row API.
///
/// Temporal values use chrono's ISO-8601 representation.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(v) => serializer.serialize_str(v),
            Self::Integer(v) => serializer.serialize_i64(*v),
            Self::Decimal(v) => serializer.serialize_f64(*v),
            Self::Boolean(v) => serializer.serialize_bool(*v),
            Self::Temporal(v) => v.serialize(serializer),
        }
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `col = $n`
    Eq(Value),
    /// `col IN ($n, ..., $m)`
    In(Vec<Value>),
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        Self::Eq(v)
    }
}

impl From<Vec<Value>> for FilterValue {
    fn from(values: Vec<Value>) -> Self {
        Self::In(values)
    }
}

/// Declared column type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Temporal,
}

impl ColumnType {
    /// SQL type used in `CREATE TABLE` statements.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "VARCHAR(255)",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL(10,2)",
            Self::Boolean => "BOOLEAN",
            Self::Temporal => "TIMESTAMP",
        }
    }
}
