//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::data_store::DataStore;
use crate::storage::db::{DEFAULT_ACQUIRE_TIMEOUT, SqlitePool, mask_url};
use crate::storage::layout_store::LayoutStore;
use crate::storage::schema::{Catalog, init_schema};

/// Minimum connection pool size.
const MIN_POOL_SIZE: u32 = 2;

/// Maximum connection pool size.
const MAX_POOL_SIZE: u32 = 32;

/// Calculate default pool size based on available CPU parallelism.
///
/// Returns the number of available CPUs, clamped between MIN_POOL_SIZE and MAX_POOL_SIZE.
fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|p| (p.get() as u32).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE))
        .unwrap_or(4)
}

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    pool_size: u32,
    acquire_timeout: Duration,
    catalog: Catalog,
}

impl StorageBuilder {
    /// Create a new storage builder for a sqlx SQLite URL.
    ///
    /// Pool size defaults to the number of available CPUs (clamped to 2-32);
    /// the catalog defaults to [`Catalog::standard`].
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: default_pool_size(),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            catalog: Catalog::standard(),
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Set how long a query waits for a free connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Replace the table catalog.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Connect, initialize the schema and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        create_parent_dir(&self.url)?;

        let pool = SqlitePool::connect_with(&self.url, self.pool_size, self.acquire_timeout).await?;
        init_schema(&pool, &self.catalog).await?;

        tracing::info!(
            url = %mask_url(&self.url),
            pool_size = self.pool_size,
            tables = self.catalog.tables().count(),
            "Storage initialized"
        );

        let catalog = Arc::new(self.catalog);
        Ok(StorageHandles {
            data_store: DataStore::new(pool.clone(), catalog),
            layout_store: LayoutStore::new(pool.clone()),
            pool,
        })
    }
}

/// Create the directory holding an on-disk database file.
fn create_parent_dir(url: &str) -> Result<(), StorageError> {
    let Some(path) = url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to all storage layer facades.
#[derive(Debug, Clone)]
pub struct StorageHandles {
    /// Facade for querying and inserting data table rows.
    pub data_store: DataStore,
    /// Facade for dashboard layouts.
    pub layout_store: LayoutStore,
    pool: SqlitePool,
}

impl StorageHandles {
    /// Close the pool, waiting for checked-out connections to return.
    pub async fn shutdown(self) {
        self.pool.close().await;
        tracing::info!("Storage closed");
    }
}
