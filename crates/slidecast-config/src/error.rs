//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent for the selected configuration.
    #[error("required configuration key {key} is not set")]
    Missing {
        /// The missing environment key.
        key: &'static str,
    },
    /// A key holds a value that cannot be parsed or is out of range.
    #[error("configuration key {key} holds invalid value `{value}`")]
    InvalidValue {
        /// The offending environment key.
        key: &'static str,
        /// The raw value encountered.
        value: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
