//! Table schema definitions, inference and DDL generation.
//!
//! Tables are declared once at startup in a [`Catalog`]. The catalog doubles
//! as the table allow-list consulted by the query builder: a table that is not
//! declared here can never appear in generated SQL.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::query::ValidationError;
use crate::storage::types::{ColumnType, Record};

/// Name of the synthetic server metrics table.
pub const SERVER_METRICS_TABLE: &str = "server_metrics";

/// Name of the surrogate primary key added to every data table.
pub const SURROGATE_KEY: &str = "id";

/// SQL statements for the dashboard layout table.
///
/// Timestamps are stored as Unix milliseconds. `is_active = 0` marks a
/// deleted layout.
pub const DASHBOARD_LAYOUTS_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS dashboard_layouts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    dashboard_id VARCHAR(50) NOT NULL DEFAULT 'default',
    name         VARCHAR(100) NOT NULL DEFAULT 'default',
    config       TEXT NOT NULL,
    created_at   BIGINT NOT NULL,
    updated_at   BIGINT NOT NULL,
    is_active    BOOLEAN NOT NULL DEFAULT 1,
    UNIQUE (dashboard_id, name)
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_layouts_dashboard_id ON dashboard_layouts(dashboard_id)",
];

/// Errors raised while deriving or checking a table schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The sample record has no columns to infer from.
    #[error("schema error: cannot infer columns from an empty sample")]
    EmptySample,

    /// A table or column name is not a plain SQL identifier.
    #[error("schema error: invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// The same column is declared twice.
    #[error("schema error: duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A record does not match the declared schema of its table.
    #[error("schema error: record does not match table '{table}': {detail}")]
    Mismatch { table: String, detail: String },
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Returns true if `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Derive column definitions from a sample record, in key order.
///
/// # Errors
/// Returns [`SchemaError::EmptySample`] for a record without columns and
/// [`SchemaError::InvalidIdentifier`] for keys that are not plain identifiers.
pub fn infer(sample: &Record) -> Result<Vec<ColumnDef>, SchemaError> {
    if sample.is_empty() {
        return Err(SchemaError::EmptySample);
    }

    sample
        .iter()
        .map(|(name, value)| {
            if !is_identifier(name) {
                return Err(SchemaError::InvalidIdentifier(name.clone()));
            }
            Ok(ColumnDef::new(name.clone(), value.column_type()))
        })
        .collect()
}

/// Build an idempotent `CREATE TABLE` statement with a surrogate identity key.
pub fn ddl(table: &str, columns: &[ColumnDef]) -> String {
    let column_sql: Vec<String> = columns
        .iter()
        .map(|c| format!("    {} {} NOT NULL", c.name, c.column_type.sql_type()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    {SURROGATE_KEY} INTEGER PRIMARY KEY AUTOINCREMENT,\n{}\n)",
        column_sql.join(",\n")
    )
}

/// Declared schema of a data table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
    indexed: Vec<String>,
}

impl TableSchema {
    /// Declare a table schema.
    ///
    /// # Errors
    /// Fails if the table or any column name is not a plain identifier, the
    /// column list is empty, a column is repeated, or a column shadows the
    /// surrogate key.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(SchemaError::InvalidIdentifier(name));
        }
        if columns.is_empty() {
            return Err(SchemaError::EmptySample);
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !is_identifier(&column.name) {
                return Err(SchemaError::InvalidIdentifier(column.name.clone()));
            }
            if column.name.eq_ignore_ascii_case(SURROGATE_KEY)
                || !seen.insert(column.name.to_ascii_lowercase())
            {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self {
            name,
            columns,
            indexed: Vec::new(),
        })
    }

    /// Declare a table schema from a sample record.
    pub fn from_sample(name: impl Into<String>, sample: &Record) -> Result<Self, SchemaError> {
        Self::new(name, infer(sample)?)
    }

    /// Add secondary indexes on the given columns.
    ///
    /// # Errors
    /// Returns [`SchemaError::Mismatch`] if a column is not declared.
    pub fn with_indexes(mut self, columns: &[&str]) -> Result<Self, SchemaError> {
        for column in columns {
            if self.column(column).is_none() {
                return Err(SchemaError::Mismatch {
                    table: self.name.clone(),
                    detail: format!("cannot index unknown column '{column}'"),
                });
            }
            self.indexed.push((*column).to_string());
        }
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Look up a declared column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// `CREATE TABLE` followed by one `CREATE INDEX` per indexed column.
    pub fn create_statements(&self) -> Vec<String> {
        let mut statements = vec![ddl(&self.name, &self.columns)];
        statements.extend(self.indexed.iter().map(|column| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                table = self.name
            )
        }));
        statements
    }

    /// Check that a record carries exactly the declared columns, in order,
    /// with matching value types.
    pub fn validate_record(&self, record: &Record) -> Result<(), SchemaError> {
        let mismatch = |detail: String| SchemaError::Mismatch {
            table: self.name.clone(),
            detail,
        };

        if record.len() != self.columns.len() {
            return Err(mismatch(format!(
                "expected {} columns, got {}",
                self.columns.len(),
                record.len()
            )));
        }

        for ((key, value), column) in record.iter().zip(&self.columns) {
            if key != &column.name {
                return Err(mismatch(format!(
                    "expected column '{}', got '{}'",
                    column.name, key
                )));
            }
            if value.column_type() != column.column_type {
                return Err(mismatch(format!(
                    "column '{}' expects {}, got {}",
                    key,
                    column.column_type,
                    value.column_type()
                )));
            }
        }

        Ok(())
    }

    /// Build a schema from a static column list known to be well formed.
    fn declared(name: &str, columns: &[(&str, ColumnType)], indexed: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(n, t)| ColumnDef::new(*n, *t))
                .collect(),
            indexed: indexed.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Declared schema of the `server_metrics` table.
pub fn server_metrics_schema() -> TableSchema {
    use ColumnType::{Decimal, Integer, Temporal, Text};

    TableSchema::declared(
        SERVER_METRICS_TABLE,
        &[
            ("timestamp", Temporal),
            ("server_name", Text),
            ("server_ip", Text),
            ("server_zone", Text),
            ("server_type", Text),
            ("service_name", Text),
            ("environment", Text),
            ("os_type", Text),
            ("install_date", Temporal),
            ("last_update_date", Temporal),
            ("next_maintenance_date", Temporal),
            ("last_backup_date", Temporal),
            ("certificate_expiry_date", Temporal),
            ("days_since_install", Integer),
            ("days_since_last_update", Integer),
            ("days_until_maintenance", Integer),
            ("days_since_last_backup", Integer),
            ("days_until_cert_expiry", Integer),
            ("cpu_usage", Decimal),
            ("memory_usage", Decimal),
            ("disk_usage", Decimal),
            ("network_in", Integer),
            ("network_out", Integer),
            ("response_time", Decimal),
            ("requests_per_second", Integer),
            ("error_rate", Decimal),
            ("revenue_impact", Decimal),
            ("user_sessions", Integer),
            ("throughput", Integer),
            ("status", Text),
            ("uptime_days", Integer),
            ("last_maintenance", Temporal),
        ],
        &[
            "timestamp",
            "server_name",
            "service_name",
            "environment",
            "status",
            "server_zone",
        ],
    )
}

/// Set of declared data tables. Acts as the table allow-list.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in `server_metrics` table.
    pub fn standard() -> Self {
        Self::new().with_table(server_metrics_schema())
    }

    /// Register a table schema, replacing any previous declaration.
    #[must_use]
    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.tables.insert(schema.name.clone(), schema);
        self
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }

    /// Resolve a caller-supplied table name against the allow-list.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownTable`] for undeclared tables.
    pub fn resolve(&self, table: &str) -> Result<&TableSchema, ValidationError> {
        self.get(table)
            .ok_or_else(|| ValidationError::UnknownTable(table.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}

/// Initialize the database schema.
///
/// Creates every catalog table (with its indexes) and the layout table if
/// they don't exist.
pub async fn init_schema(pool: &SqlitePool, catalog: &Catalog) -> Result<(), StorageError> {
    for table in catalog.tables() {
        for statement in table.create_statements() {
            sqlx::query(&statement).execute(pool.inner()).await?;
        }
        tracing::debug!(table = %table.name(), "Table created/verified");
    }

    for statement in DASHBOARD_LAYOUTS_DDL {
        sqlx::query(statement).execute(pool.inner()).await?;
    }

    tracing::info!("Database schema initialized");
    Ok(())
}
