//! In-memory backend for driving resources from tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};

use confsync::backends::{BackendError, Result};
use confsync::store::keypath;
use confsync::{Shutdown, StoreClient};

pub struct MockStoreClient {
    values: Mutex<HashMap<String, String>>,
    revision: watch::Sender<u64>,
    fail_fetch: AtomicBool,
    fail_watch: AtomicBool,
    /// When set, every fetch waits for a permit.
    gate: Option<Semaphore>,
    fetches: AtomicUsize,
    watches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockStoreClient {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let (revision, _) = watch::channel(1);
        Self {
            values: Mutex::new(to_map(pairs)),
            revision,
            fail_fetch: AtomicBool::new(false),
            fail_watch: AtomicBool::new(false),
            gate: None,
            fetches: AtomicUsize::new(0),
            watches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetches block until [`release`](Self::release) hands out permits.
    pub fn blocking(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    /// Replaces every value and wakes pending watches.
    pub fn replace(&self, pairs: &[(&str, &str)]) {
        *self.values.lock().unwrap() = to_map(pairs);
        self.revision.send_modify(|r| *r += 1);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_watch(&self, fail: bool) {
        self.fail_watch.store(fail, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn watches(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BackendError::Watch("backend unavailable".to_string()));
        }

        let values = self.values.lock().unwrap();
        Ok(values
            .iter()
            .filter(|(key, _)| keys.iter().any(|k| keypath::is_descendant(key, k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn watch_prefix(
        &self,
        _prefix: &str,
        _keys: &[String],
        wait_index: u64,
        shutdown: &mut Shutdown,
    ) -> Result<u64> {
        self.watches.fetch_add(1, Ordering::SeqCst);

        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(BackendError::Watch("watch failed".to_string()));
        }

        let mut changes = self.revision.subscribe();
        let current = *changes.borrow_and_update();
        if wait_index == 0 || current != wait_index {
            return Ok(current);
        }

        tokio::select! {
            _ = shutdown.wait() => Ok(wait_index),
            changed = changes.changed() => match changed {
                Ok(()) => Ok(*changes.borrow()),
                Err(_) => Err(BackendError::Watch("revision channel closed".to_string())),
            },
        }
    }
}
