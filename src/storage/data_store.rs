//! Row-oriented access to catalog tables.
//!
//! [`DataStore`] executes statements produced by the
//! [`QueryBuilder`](crate::storage::QueryBuilder) against the sqlx pool and
//! decodes rows according to the declared column types.

use std::sync::Arc;
use std::time::Instant;

use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::query::{QueryBuilder, SelectQuery};
use crate::storage::schema::{Catalog, ColumnDef};
use crate::storage::types::{ColumnType, FilterSpec, Record, Value};

/// Records inserted per transaction.
const INSERT_BATCH_SIZE: usize = 1_000;

/// Query and insert facade over the catalog tables.
#[derive(Clone)]
pub struct DataStore {
    pool: SqlitePool,
    catalog: Arc<Catalog>,
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore").finish_non_exhaustive()
    }
}

impl DataStore {
    pub fn new(pool: SqlitePool, catalog: Arc<Catalog>) -> Self {
        Self { pool, catalog }
    }

    /// The table allow-list this store serves.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Query builder bound to this store's catalog.
    pub fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.catalog)
    }

    /// Verify the pool can serve queries.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.pool.ping().await
    }

    /// Build and run a filtered select.
    pub async fn select(
        &self,
        table: &str,
        filters: Option<&FilterSpec>,
        limit: Option<i64>,
    ) -> Result<Vec<Record>, StorageError> {
        let query = self.query_builder().build_select(table, filters, limit)?;
        self.fetch(&query).await
    }

    /// Execute a built select and decode every row.
    pub async fn fetch(&self, query: &SelectQuery) -> Result<Vec<Record>, StorageError> {
        let started = Instant::now();

        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = bind_value(statement, param);
        }
        let rows = statement.fetch_all(self.pool.inner()).await?;

        let records = rows
            .iter()
            .map(|row| decode_row(row, &query.columns))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            rows = records.len(),
            params = query.params.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Select executed"
        );
        Ok(records)
    }

    /// Insert records into a catalog table.
    ///
    /// Every record is checked against the declared schema before anything
    /// is written; rows are committed in batches of 1000.
    ///
    /// Returns the number of inserted rows.
    pub async fn insert_records(&self, table: &str, records: &[Record]) -> Result<u64, StorageError> {
        let schema = self.catalog.resolve(table)?;
        for record in records {
            schema.validate_record(record)?;
        }
        if records.is_empty() {
            return Ok(0);
        }

        let sql = self.query_builder().build_insert(table)?;
        let total_batches = records.len().div_ceil(INSERT_BATCH_SIZE);
        let mut inserted = 0;

        for (i, batch) in records.chunks(INSERT_BATCH_SIZE).enumerate() {
            let mut tx = self.pool.inner().begin().await?;
            for record in batch {
                let mut statement = sqlx::query(&sql);
                for value in record.values() {
                    statement = bind_value(statement, value);
                }
                inserted += statement.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;

            tracing::debug!(
                table,
                batch = i + 1,
                total_batches,
                rows = batch.len(),
                "Insert batch committed"
            );
        }

        tracing::info!(table, rows = inserted, "Records inserted");
        Ok(inserted)
    }

    /// Number of rows in a catalog table.
    pub async fn count(&self, table: &str) -> Result<i64, StorageError> {
        let schema = self.catalog.resolve(table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", schema.name());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(self.pool.inner()).await?;
        Ok(count)
    }

    /// Declared column names of a catalog table, surrogate key excluded.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, StorageError> {
        let schema = self.catalog.resolve(table)?;
        Ok(schema.column_names().map(str::to_string).collect())
    }
}

fn bind_value<'q>(
    statement: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Text(v) => statement.bind(v.clone()),
        Value::Integer(v) => statement.bind(*v),
        Value::Decimal(v) => statement.bind(*v),
        Value::Boolean(v) => statement.bind(*v),
        Value::Temporal(v) => statement.bind(*v),
    }
}

/// Decode a row by declared column type.
///
/// SQLite stores values by affinity (an integral decimal comes back as an
/// integer), so decoding skips sqlx's storage-class check and converts.
fn decode_row(row: &SqliteRow, columns: &[ColumnDef]) -> Result<Record, sqlx::Error> {
    let mut record = Record::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value = match column.column_type {
            ColumnType::Text => Value::Text(row.try_get_unchecked(i)?),
            ColumnType::Integer => Value::Integer(row.try_get_unchecked(i)?),
            ColumnType::Decimal => Value::Decimal(row.try_get_unchecked(i)?),
            ColumnType::Boolean => Value::Boolean(row.try_get_unchecked(i)?),
            ColumnType::Temporal => Value::Temporal(row.try_get_unchecked(i)?),
        };
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}
