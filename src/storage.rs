//! Storage Layer
//!
//! SQLite storage behind a sqlx connection pool:
//! - **Catalog**: declared tables, doubling as the query allow-list
//! - **Query builder**: parameterized `SELECT`/`INSERT` from filter maps
//! - **Stores**: async facades sharing one pool
//!
//! # Components
//!
//! - [`Catalog`] / [`TableSchema`]: Table declarations, schema inference and DDL
//! - [`QueryBuilder`]: Filter map to parameterized SQL
//! - [`DataStore`]: Filtered reads and batched inserts on data tables
//! - [`LayoutStore`]: Dashboard layout documents
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod builder;
mod data_store;
pub mod db;
mod error;
mod layout_store;
mod query;
pub mod schema;
mod types;

pub use builder::{StorageBuilder, StorageHandles};
pub use data_store::DataStore;
pub use error::StorageError;
pub use layout_store::{
    DEFAULT_LAYOUT_KEY, DashboardSummary, LAYOUT_VERSION, LayoutStore, LayoutSummary, SavedLayout,
};
pub use query::{QueryBuilder, SelectQuery, ValidationError};
pub use schema::{
    Catalog, ColumnDef, SERVER_METRICS_TABLE, SchemaError, TableSchema, infer, server_metrics_schema,
};
pub use types::{ColumnType, FilterSpec, FilterValue, Record, Value};
