//! Template resources: discovery, rendering and syncing of managed files.

pub mod command;
pub mod config;
pub mod error;
pub mod fileinfo;
pub mod funcs;
pub mod resource;

pub use config::{parse_mode, LoadedResources, ResourceConfig, ResourceLoader};
pub use error::{ResourceError, Result};
pub use fileinfo::{same_config, FileMetadata};
pub use funcs::build_environment;
pub use resource::{RenameFn, TemplateResource, DEFAULT_FILE_MODE};
