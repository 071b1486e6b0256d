//! YAML/JSON file backend.
//!
//! Reads one or more documents (or directories of them), flattens them into
//! path-keyed values and watches them for changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::watch;
use walkdir::WalkDir;

use super::error::{BackendError, Result};
use super::tree::{flatten, ListIndex};
use super::StoreClient;
use crate::config::{FileBackendConfig, ListIndexMode};
use crate::shutdown::Shutdown;
use crate::store::keypath;

const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct FileClient {
    paths: Vec<PathBuf>,
    list_index: ListIndex,
    /// Bumped by the watcher on every observed change.
    revision: Arc<watch::Sender<u64>>,
    /// Started by the first `watch_prefix` call and kept for the client's
    /// lifetime, so changes between two calls are not lost.
    watcher: Mutex<Option<Debouncer<RecommendedWatcher>>>,
}

impl FileClient {
    pub fn new(config: &FileBackendConfig) -> Result<Self> {
        if config.paths.is_empty() {
            return Err(BackendError::MissingParameter("file.paths".to_string()));
        }

        let list_index = match config.list_index {
            ListIndexMode::Positional => ListIndex::Positional,
            ListIndexMode::Name => {
                if config.name_field.is_empty() {
                    return Err(BackendError::MissingParameter("file.name_field".to_string()));
                }
                ListIndex::NameField(config.name_field.clone())
            }
        };

        Ok(Self {
            paths: config.paths.clone(),
            list_index,
            revision: Arc::new(watch::channel(1).0),
            watcher: Mutex::new(None),
        })
    }

    fn ensure_watching(&self) -> Result<()> {
        let mut watcher = self
            .watcher
            .lock()
            .map_err(|_| BackendError::Watch("watcher lock poisoned".to_string()))?;
        if watcher.is_some() {
            return Ok(());
        }

        let revision = Arc::clone(&self.revision);
        let mut debouncer: Debouncer<RecommendedWatcher> =
            new_debouncer(DEBOUNCE, move |result: DebounceEventResult| match result {
                Ok(events) if events.is_empty() => {}
                Ok(events) => {
                    revision.send_modify(|r| *r += 1);
                    log::debug!(
                        "File backend observed {} change(s), revision {}",
                        events.len(),
                        *revision.borrow()
                    );
                }
                Err(e) => {
                    // Events may have been dropped; force a re-read.
                    log::warn!("File watch error: {}", e);
                    revision.send_modify(|r| *r += 1);
                }
            })
            .map_err(|e| BackendError::Watch(e.to_string()))?;

        for path in &self.paths {
            let mode = if path.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            debouncer
                .watcher()
                .watch(path, mode)
                .map_err(|e| BackendError::Watch(format!("{}: {}", path.display(), e)))?;
        }

        log::info!("Watching {} file backend path(s)", self.paths.len());
        *watcher = Some(debouncer);
        Ok(())
    }

    /// Expands configured paths into the documents to read, sorted so later
    /// files override earlier ones deterministically.
    fn documents(&self) -> Result<Vec<PathBuf>> {
        let mut documents = Vec::new();

        for path in &self.paths {
            let metadata = std::fs::metadata(path).map_err(|e| BackendError::Read {
                path: path.clone(),
                source: e,
            })?;

            if metadata.is_dir() {
                let mut found: Vec<PathBuf> = WalkDir::new(path)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_document(e.path()))
                    .map(|e| e.into_path())
                    .collect();
                found.sort();
                documents.extend(found);
            } else {
                documents.push(path.clone());
            }
        }

        Ok(documents)
    }

    fn read_document(&self, path: &Path) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(path).map_err(|e| BackendError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let value: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|e| BackendError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(flatten(&value, &self.list_index).into_iter().collect())
    }
}

fn is_document(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

#[async_trait]
impl StoreClient for FileClient {
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let mut values = HashMap::new();
        for document in self.documents()? {
            values.extend(self.read_document(&document)?);
        }

        values.retain(|key, _| keys.iter().any(|k| keypath::is_descendant(key, k)));
        log::debug!("File backend resolved {} keys", values.len());
        Ok(values)
    }

    async fn watch_prefix(
        &self,
        _prefix: &str,
        _keys: &[String],
        wait_index: u64,
        shutdown: &mut Shutdown,
    ) -> Result<u64> {
        self.ensure_watching()?;

        let mut changes = self.revision.subscribe();
        let current = *changes.borrow_and_update();
        if wait_index == 0 || current != wait_index {
            return Ok(current);
        }

        loop {
            tokio::select! {
                _ = shutdown.wait() => return Ok(wait_index),
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(BackendError::Watch("watch channel closed".to_string()));
                    }
                    let next = *changes.borrow_and_update();
                    if next != wait_index {
                        return Ok(next);
                    }
                }
            }
        }
    }
}
