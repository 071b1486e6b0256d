use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Loads the config file if it exists, otherwise returns defaults. Command
/// line overrides are applied by the caller, which must then call
/// [`validate_config`].
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::debug!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    log::debug!("Loading config file {}", path.display());
    load_config(path)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.interval == 0 {
        return Err(ConfigError::Validation {
            message: "interval must be greater than zero".to_string(),
        });
    }

    if !config.prefix.starts_with('/') {
        return Err(ConfigError::Validation {
            message: format!("prefix must be an absolute key path, got '{}'", config.prefix),
        });
    }

    if config.backend.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "backend must not be empty".to_string(),
        });
    }

    if config.confdir.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "confdir must not be empty".to_string(),
        });
    }

    Ok(())
}
