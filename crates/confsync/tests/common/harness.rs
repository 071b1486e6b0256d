//! Test harness for isolated resource processing.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use confsync::template::ResourceConfig;
use confsync::{Config, StoreClient, TemplateResource};

/// Temporary confdir (with `conf.d/` and `templates/`) plus a destination
/// directory for rendered files.
pub struct TestHarness {
    temp_dir: TempDir,
    pub confdir: PathBuf,
    pub dest_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let confdir = temp_dir.path().join("confsync");
        let dest_dir = temp_dir.path().join("etc");

        fs::create_dir_all(confdir.join("conf.d")).expect("Failed to create conf.d");
        fs::create_dir_all(confdir.join("templates")).expect("Failed to create templates");
        fs::create_dir_all(&dest_dir).expect("Failed to create destination directory");

        Self {
            temp_dir,
            confdir,
            dest_dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> Config {
        Config {
            confdir: self.confdir.clone(),
            ..Config::default()
        }
    }

    pub fn write_template(&self, name: &str, content: &str) -> PathBuf {
        let path = self.confdir.join("templates").join(name);
        fs::write(&path, content).expect("Failed to write template");
        path
    }

    pub fn write_resource(&self, name: &str, content: &str) -> PathBuf {
        let path = self.confdir.join("conf.d").join(name);
        fs::write(&path, content).expect("Failed to write resource");
        path
    }

    pub fn dest(&self, name: &str) -> PathBuf {
        self.dest_dir.join(name)
    }

    /// Builds a resource config from a `[template]` body. `dest` is resolved
    /// inside the destination directory.
    pub fn resource_config(&self, src: &str, dest: &str, extra: &str) -> ResourceConfig {
        self.resource_config_with(&self.config(), src, dest, extra)
    }

    pub fn resource_config_with(
        &self,
        config: &Config,
        src: &str,
        dest: &str,
        extra: &str,
    ) -> ResourceConfig {
        let body = format!(
            "[template]\nsrc = \"{}\"\ndest = \"{}\"\n{}\n",
            src,
            self.dest(dest).display(),
            extra
        );
        ResourceConfig::from_toml(&body, Path::new("test.toml"), config)
            .expect("Failed to parse resource config")
    }

    pub fn resource(
        &self,
        config: ResourceConfig,
        client: Arc<dyn StoreClient>,
    ) -> TemplateResource {
        TemplateResource::new(config, client, false)
    }

    /// Names of the files currently in the destination directory.
    pub fn dest_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dest_dir)
            .expect("Failed to read destination directory")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
