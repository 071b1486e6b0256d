use std::path::PathBuf;
use thiserror::Error;

use crate::backends::BackendError;
use crate::template::ResourceError;

#[derive(Error, Debug)]
pub enum ConfsyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key does not exist: {key}")]
    NotFound { key: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfsyncError>;
