//! Maps configured backend names to constructors.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::env::EnvClient;
use super::error::{BackendError, Result};
use super::file::FileClient;
use super::StoreClient;
use crate::config::Config;

/// Builds a store client from the process configuration. Constructors
/// validate their parameters before doing any I/O.
pub type BackendFactory = fn(&Config) -> Result<Arc<dyn StoreClient>>;

/// Registry of available backends.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("env", |config| {
            Ok(Arc::new(EnvClient::new(&config.env)?) as Arc<dyn StoreClient>)
        });
        registry.register("file", |config| {
            Ok(Arc::new(FileClient::new(&config.file)?) as Arc<dyn StoreClient>)
        });
        registry
    }
}

impl BackendRegistry {
    /// Creates a registry with no backends.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Registered backend names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the backend selected by `config.backend`.
    pub fn create(&self, config: &Config) -> Result<Arc<dyn StoreClient>> {
        let factory = self
            .factories
            .get(&config.backend)
            .ok_or_else(|| BackendError::UnknownBackend {
                name: config.backend.clone(),
                available: self.names().join(", "),
            })?;

        log::info!("Using backend '{}'", config.backend);
        factory(config)
    }
}
