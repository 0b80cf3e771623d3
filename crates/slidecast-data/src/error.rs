//! Error types for the data access layer.

use thiserror::Error;

/// Errors raised by repository operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// A database call failed.
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),
    /// Applying migrations failed.
    #[error("database migrations failed")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// A stored JSON payload could not be decoded.
    #[error("persisted row payload is malformed")]
    Codec {
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored column holds a value outside its closed set.
    #[error("column {column} holds invalid value `{value}`")]
    Invalid {
        /// Column name.
        column: &'static str,
        /// Raw value encountered.
        value: String,
    },
}

/// Convenience alias for data-layer results.
pub type DataResult<T> = Result<T, DataError>;
