//! Environment variable backend.
//!
//! Key `/app/db/host` maps to variable `APP_DB_HOST` (with the default `_`
//! separator). Every variable equal to the transformed key, or below it on a
//! separator boundary, is returned under its lower-cased path form.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::{BackendError, Result};
use super::StoreClient;
use crate::config::EnvBackendConfig;
use crate::shutdown::Shutdown;

pub struct EnvClient {
    separator: String,
}

impl EnvClient {
    pub fn new(config: &EnvBackendConfig) -> Result<Self> {
        if config.separator.is_empty() {
            return Err(BackendError::MissingParameter("env.separator".to_string()));
        }
        if config.separator.contains('/') {
            return Err(BackendError::InvalidParameter {
                name: "env.separator".to_string(),
                reason: "must not contain '/'".to_string(),
            });
        }
        Ok(Self {
            separator: config.separator.clone(),
        })
    }

    fn to_variable(&self, key: &str) -> String {
        key.trim_start_matches('/')
            .replace('/', &self.separator)
            .to_uppercase()
    }

    fn to_key(&self, variable: &str) -> String {
        format!("/{}", variable.to_lowercase().replace(&self.separator, "/"))
    }

    /// Matches `name` against a transformed key on separator boundaries, so
    /// `APP` covers `APP_NAME` but not `APPLE_COLOR`.
    fn is_below(&self, name: &str, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        match name.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with(self.separator.as_str()),
            None => false,
        }
    }

    fn collect(
        &self,
        keys: &[String],
        variables: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        let prefixes: Vec<String> = keys.iter().map(|k| self.to_variable(k)).collect();
        let mut values = HashMap::new();

        for (name, value) in variables {
            if prefixes.iter().any(|p| self.is_below(&name, p)) {
                values.insert(self.to_key(&name), value);
            }
        }

        values
    }
}

#[async_trait]
impl StoreClient for EnvClient {
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let values = self.collect(keys, std::env::vars());
        log::debug!("Env backend resolved {} keys", values.len());
        Ok(values)
    }

    async fn watch_prefix(
        &self,
        _prefix: &str,
        _keys: &[String],
        wait_index: u64,
        shutdown: &mut Shutdown,
    ) -> Result<u64> {
        if wait_index == 0 {
            return Ok(1);
        }
        // The process environment never changes underneath us.
        shutdown.wait().await;
        Ok(wait_index)
    }
}
