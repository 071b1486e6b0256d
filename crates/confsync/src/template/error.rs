//! Errors surfaced by a template resource cycle.

use std::path::PathBuf;
use thiserror::Error;

use crate::backends::BackendError;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Invalid resource in '{path}': {message}")]
    InvalidResource { path: PathBuf, message: String },

    #[error("Missing template: {0}")]
    MissingTemplate(PathBuf),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Unable to render template '{path}': {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("Config check failed: '{command}' exited with {}: {output}", exit_code(.status))]
    CheckFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Failed to replace '{path}': {source}")]
    Apply {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reload command '{command}' exited with {}: {output}", exit_code(.status))]
    ReloadFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_code(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl ResourceError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ResourceError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for template resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
