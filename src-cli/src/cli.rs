use std::path::PathBuf;

use clap::Parser;
use confsync::Config;

/// Keep local configuration files in sync with a key/value backend.
#[derive(Debug, Parser)]
#[command(name = "confsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file to read; defaults to /etc/confsync/confsync.toml when present
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Directory containing conf.d/ and templates/
    #[arg(long, value_name = "DIR")]
    pub confdir: Option<PathBuf>,

    /// Backend to fetch values from
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Seconds between runs in interval mode
    #[arg(short, long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Render and compare only, never touch destination files
    #[arg(long)]
    pub noop: bool,

    /// Run every resource once and exit
    #[arg(long)]
    pub onetime: bool,

    /// Re-render when the backend reports a change instead of polling
    #[arg(short, long)]
    pub watch: bool,

    /// Key prefix prepended to every resource prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Leave staged files next to their destinations
    #[arg(long)]
    pub keep_stage_file: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Document or directory for the file backend (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Separator used by the env backend between key segments
    #[arg(long)]
    pub env_separator: Option<String>,
}

impl Cli {
    /// Overrides config file values with the flags that were given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(confdir) = &self.confdir {
            config.confdir = confdir.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(separator) = &self.env_separator {
            config.env.separator = separator.clone();
        }
        if !self.files.is_empty() {
            config.file.paths = self.files.clone();
        }

        config.noop |= self.noop;
        config.onetime |= self.onetime;
        config.watch |= self.watch;
        config.keep_stage_file |= self.keep_stage_file;
    }
}
