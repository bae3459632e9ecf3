//! Database abstraction layer.
//!
//! Currently supports SQLite through sqlx. All generated SQL uses `$n`
//! placeholders, which both the SQLite and PostgreSQL drivers accept.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/vitrine.db?mode=rwc").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqlitePool, mask_url};
