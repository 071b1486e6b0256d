//! In-memory key/value snapshot queried by templates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glob::{MatchOptions, Pattern};
use serde::Serialize;

use super::keypath;
use crate::error::StoreError;

/// A single key and its value. Templates see the fields as `key` and `value`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// `*` and `?` must not cross a `/` boundary.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Path-keyed store safe for concurrent access. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    pairs: Arc<RwLock<BTreeMap<String, KvPair>>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, KvPair>> {
        self.pairs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, KvPair>> {
        self.pairs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the pair stored under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let pair = KvPair::new(key.clone(), value);
        self.write().insert(key, pair);
    }

    pub fn del(&self, key: &str) {
        self.write().remove(key);
    }

    /// Removes every key.
    pub fn purge(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    /// Returns the value for `key`, or `default` when the key is absent and a
    /// default was supplied.
    pub fn get_value(&self, key: &str, default: Option<&str>) -> Result<String, StoreError> {
        match (self.get(key), default) {
            (Ok(pair), _) => Ok(pair.value),
            (Err(_), Some(default)) => Ok(default.to_string()),
            (Err(e), None) => Err(e),
        }
    }

    /// Returns every pair whose key matches the glob `pattern`, sorted by key.
    pub fn get_all(&self, pattern: &str) -> Result<Vec<KvPair>, StoreError> {
        let compiled = Pattern::new(pattern).map_err(|e| StoreError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(self
            .read()
            .values()
            .filter(|pair| compiled.matches_with(&pair.key, MATCH_OPTIONS))
            .cloned()
            .collect())
    }

    /// Values of every pair matching `pattern`, sorted by value rather than by
    /// key. Templates written against the legacy store depend on this order.
    pub fn get_all_values(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut values: Vec<String> = self
            .get_all(pattern)?
            .into_iter()
            .map(|pair| pair.value)
            .collect();
        values.sort();
        Ok(values)
    }

    /// Names one segment below `dir`, for leaves and sub-directories alike.
    pub fn list(&self, dir: &str) -> Vec<String> {
        let prefix = keypath::terms(dir);
        let mut names = BTreeSet::new();

        for key in self.read().keys() {
            if key == dir {
                names.insert(keypath::base(key));
                continue;
            }
            let parent = keypath::terms(&keypath::dir(key));
            if keypath::has_prefix_terms(&prefix, &parent) {
                if let Some(first) = strip_key(key, dir).split('/').next() {
                    names.insert(first.to_string());
                }
            }
        }

        names.into_iter().collect()
    }

    /// Names one segment below `dir` that have further descendants.
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = keypath::terms(dir);
        let mut names = BTreeSet::new();

        for key in self.read().keys() {
            if !key.starts_with(dir) {
                continue;
            }
            let parent = keypath::terms(&keypath::dir(key));
            if keypath::has_prefix_terms(&prefix, &parent) && parent.len() > prefix.len() {
                names.insert(parent[prefix.len()].clone());
            }
        }

        names.into_iter().collect()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }
}

fn strip_key<'a>(key: &'a str, prefix: &str) -> &'a str {
    let rest = key.strip_prefix(prefix).unwrap_or(key);
    rest.strip_prefix('/').unwrap_or(rest)
}
