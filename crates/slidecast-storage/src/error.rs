//! Error types for storage operations.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("storage object not found")]
    NotFound {
        /// The probed object key.
        key: String,
    },
    /// A local filesystem operation failed.
    #[error("storage io operation failed")]
    Io {
        /// Operation identifier (`put_file.read`, `get_file.write`, ...).
        op: &'static str,
        /// Path involved, when one exists.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A cloud provider call failed.
    #[error("storage provider operation failed")]
    Provider {
        /// Operation identifier (`put_object`, `get_object`, ...).
        op: &'static str,
        /// Object key involved.
        key: String,
        /// Underlying SDK failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend cannot mint presigned URLs.
    #[error("storage backend does not support presigned urls")]
    PresignUnsupported {
        /// Object key the caller asked about.
        key: String,
    },
    /// The backend client could not be constructed.
    #[error("storage backend configuration is invalid")]
    Config {
        /// Human-readable detail.
        detail: String,
    },
}

/// Convenience alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Whether the error means "object absent" rather than "operation broken".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
