//! Error types for the state store.

use thiserror::Error;

use crate::kv::KvError;

/// Errors raised by state-store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The key/value substrate failed.
    #[error("state substrate operation failed")]
    Kv(#[from] KvError),
    /// A persisted state record could not be decoded.
    #[error("persisted state record is malformed")]
    Codec {
        /// Key holding the malformed record.
        key: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for state-store results.
pub type StateResult<T> = Result<T, StateError>;
