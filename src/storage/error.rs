//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure, which can be
//! matched to determine the underlying cause (connection, query, schema,
//! validation, etc.).

use thiserror::Error;

use crate::storage::query::ValidationError;
use crate::storage::schema::SchemaError;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Pool exhausted, closed, or database unreachable. Not retried.
    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Query execution failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Table schema could not be derived or a record does not match it.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Request rejected before any SQL was built or executed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g., directory creation failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Connection(err),
            other => Self::Database(other),
        }
    }
}

impl StorageError {
    /// Whether the error stems from pool/connection availability.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_connection() {
        assert!(StorageError::from(sqlx::Error::PoolTimedOut).is_connection());
        assert!(StorageError::from(sqlx::Error::PoolClosed).is_connection());
    }

    #[test]
    fn test_query_errors_map_to_database() {
        let err = StorageError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StorageError::Database(_)));
        assert!(!err.is_connection());
    }

    #[test]
    fn test_validation_message_is_transparent() {
        let err = StorageError::from(ValidationError::UnknownTable("pg_shadow".to_string()));
        assert_eq!(err.to_string(), "unknown table: 'pg_shadow'");
    }
}
