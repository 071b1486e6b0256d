use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/confsync/confsync.toml";

/// Process-wide settings, built once at startup and passed to every
/// component that needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_confdir")]
    pub confdir: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub noop: bool,
    #[serde(default)]
    pub onetime: bool,
    #[serde(default)]
    pub watch: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub keep_stage_file: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub env: EnvBackendConfig,
    #[serde(default)]
    pub file: FileBackendConfig,
}

fn default_confdir() -> PathBuf {
    PathBuf::from("/etc/confsync")
}

fn default_backend() -> String {
    "env".to_string()
}

fn default_interval() -> u64 {
    600
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            confdir: default_confdir(),
            backend: default_backend(),
            interval: default_interval(),
            noop: false,
            onetime: false,
            watch: false,
            prefix: default_prefix(),
            keep_stage_file: false,
            log_level: default_log_level(),
            env: EnvBackendConfig::default(),
            file: FileBackendConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding the resource files.
    pub fn resource_dir(&self) -> PathBuf {
        self.confdir.join("conf.d")
    }

    /// Directory that resource `src` paths are resolved against.
    pub fn template_dir(&self) -> PathBuf {
        self.confdir.join("templates")
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvBackendConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    "_".to_string()
}

impl Default for EnvBackendConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackendConfig {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub list_index: ListIndexMode,
    #[serde(default = "default_name_field")]
    pub name_field: String,
}

fn default_name_field() -> String {
    "name".to_string()
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            list_index: ListIndexMode::default(),
            name_field: default_name_field(),
        }
    }
}

/// How sequence elements are named when a document is flattened to keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListIndexMode {
    #[default]
    Positional,
    Name,
}
