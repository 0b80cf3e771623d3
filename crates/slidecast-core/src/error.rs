//! Error types for the shared domain model.

use thiserror::Error;

/// Primary error type for domain-model parsing and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A wire value did not name a known pipeline step.
    #[error("unknown pipeline step `{value}`")]
    UnknownStep {
        /// Raw value encountered on the wire.
        value: String,
    },
    /// A wire value did not name a known task type.
    #[error("unknown task type `{value}`")]
    UnknownTaskType {
        /// Raw value encountered on the wire.
        value: String,
    },
    /// A wire value did not name a known source type.
    #[error("unknown source type `{value}`")]
    UnknownSourceType {
        /// Raw value encountered on the wire.
        value: String,
    },
    /// A state payload could not be decoded.
    #[error("task state payload could not be decoded")]
    Decode {
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for domain-model results.
pub type CoreResult<T> = Result<T, CoreError>;
