//! Resource configuration files (`conf.d/*.toml`) and their discovery.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use super::error::{ResourceError, Result};
use super::fileinfo::effective_ids;
use crate::config::Config;
use crate::store::keypath;

/// On-disk shape of a resource file.
#[derive(Debug, Deserialize)]
struct ResourceFile {
    template: TemplateSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateSection {
    #[serde(default)]
    src: String,
    #[serde(default)]
    dest: PathBuf,
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    uid: Option<u32>,
    #[serde(default)]
    gid: Option<u32>,
    #[serde(default)]
    check_cmd: Option<String>,
    #[serde(default)]
    reload_cmd: Option<String>,
    #[serde(default)]
    keep_stage_file: bool,
}

/// Validated description of one managed file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Absolute path of the template source.
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Key prefix, already joined with the global prefix.
    pub prefix: String,
    pub keys: Vec<String>,
    /// Permission bits; `None` inherits from the destination.
    pub mode: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub check_cmd: Option<String>,
    pub reload_cmd: Option<String>,
    pub keep_stage_file: bool,
}

impl ResourceConfig {
    /// Keys as requested from the backend, each qualified with the prefix.
    pub fn prefixed_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| keypath::join(&[self.prefix.as_str(), key.as_str()]))
            .collect()
    }

    /// Parses a resource file's contents. `path` is only used in errors.
    pub fn from_toml(content: &str, path: &Path, config: &Config) -> Result<Self> {
        let invalid = |message: String| ResourceError::InvalidResource {
            path: path.to_path_buf(),
            message,
        };

        let file: ResourceFile = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        let section = file.template;

        if section.src.trim().is_empty() {
            return Err(invalid("empty src template".to_string()));
        }
        if section.dest.as_os_str().is_empty() {
            return Err(invalid("empty dest".to_string()));
        }

        let mode = section
            .mode
            .as_deref()
            .map(parse_mode)
            .transpose()
            .map_err(invalid)?;

        let (euid, egid) = effective_ids();

        Ok(Self {
            src: config.template_dir().join(&section.src),
            dest: section.dest,
            prefix: keypath::join(&["/", config.prefix.as_str(), section.prefix.as_str()]),
            keys: section.keys,
            mode,
            uid: section.uid.unwrap_or(euid),
            gid: section.gid.unwrap_or(egid),
            check_cmd: section.check_cmd.filter(|c| !c.trim().is_empty()),
            reload_cmd: section.reload_cmd.filter(|c| !c.trim().is_empty()),
            keep_stage_file: section.keep_stage_file || config.keep_stage_file,
        })
    }

    pub fn from_path(path: &Path, config: &Config) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResourceError::io(format!("Failed to read '{}'", path.display()), e))?;
        Self::from_toml(&content, path, config)
    }
}

/// Parses an octal permission string such as `"0644"`, `"644"` or `"0o644"`.
pub fn parse_mode(mode: &str) -> std::result::Result<u32, String> {
    let trimmed = mode.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);

    let parsed = u32::from_str_radix(digits, 8)
        .map_err(|e| format!("invalid mode '{}': {}", mode, e))?;

    if parsed > 0o7777 {
        return Err(format!("invalid mode '{}': out of range", mode));
    }
    Ok(parsed)
}

/// Resources found under `conf.d`, plus the files that failed to load.
#[derive(Debug, Default)]
pub struct LoadedResources {
    pub resources: Vec<ResourceConfig>,
    pub errors: Vec<ResourceError>,
}

/// Discovers resource files below the configured `conf.d` directory.
pub struct ResourceLoader<'a> {
    config: &'a Config,
}

impl<'a> ResourceLoader<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Paths of all `*.toml` files below `conf.d`, sorted.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = WalkDir::new(self.config.resource_dir())
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("toml"))
            .map(|e| e.into_path())
            .collect();
        paths.sort();
        paths
    }

    /// Loads every resource. A broken file only affects itself.
    pub fn load(&self) -> LoadedResources {
        let mut loaded = LoadedResources::default();
        let resource_dir = self.config.resource_dir();

        if !resource_dir.exists() {
            log::warn!(
                "Cannot load template resources: '{}' does not exist",
                resource_dir.display()
            );
            return loaded;
        }

        let paths = self.discover();
        if paths.is_empty() {
            log::warn!("Found no template resources in '{}'", resource_dir.display());
        }

        for path in paths {
            log::debug!("Found template resource {}", path.display());
            match ResourceConfig::from_path(&path, self.config) {
                Ok(resource) => loaded.resources.push(resource),
                Err(e) => {
                    log::error!("{}", e);
                    loaded.errors.push(e);
                }
            }
        }

        loaded
    }
}
