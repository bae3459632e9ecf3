//! Vitrine - server-metrics dashboard backend
//!
//! This crate serves tabular monitoring data to a dashboard front end. It can
//! be used as a library, or run as a standalone binary with the `vitrine`
//! executable.
//!
//! # Architecture
//!
//! - **Storage**: SQLite persistence behind a table allow-list, with a
//!   parameterized query builder and a layout document store
//! - **Codec**: compact and ultra columnar JSON encodings of row sets
//! - **Cache**: TTL response cache with per-key single-flight computation
//! - **Server**: Axum JSON API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vitrine::{
//!     cache::ResponseCache,
//!     server::{AppState, create_router},
//!     storage::StorageBuilder,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("sqlite:data/vitrine.db?mode=rwc").build().await?;
//! let app = create_router(AppState {
//!     data_store: handles.data_store.clone(),
//!     layout_store: handles.layout_store.clone(),
//!     cache: ResponseCache::default(),
//!     cache_ttl: Duration::from_secs(300),
//! });
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8081").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod generator;
pub mod server;
pub mod storage;

pub use cache::{CacheStatus, ResponseCache};
pub use codec::{CompactPayload, EncodingError};
pub use generator::DataGenerator;
pub use storage::{
    Catalog, DataStore, LayoutStore, QueryBuilder, Record, StorageBuilder, StorageError,
    StorageHandles, TableSchema, Value,
};
