//! Backend-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by store clients and their construction.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unknown backend '{name}', available: {available}")]
    UnknownBackend { name: String, available: String },

    #[error("Missing required backend parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid backend parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Watch error: {0}")]
    Watch(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
