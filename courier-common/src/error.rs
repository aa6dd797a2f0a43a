//! Error types for the courier-common crate.

use thiserror::Error;

/// Errors raised while assembling a [`RelayConfig`](crate::RelayConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be parsed into the expected type.
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// The configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid RON for the expected shape.
    #[error("Failed to parse configuration from {path}: {message}")]
    Parse { path: String, message: String },
}
