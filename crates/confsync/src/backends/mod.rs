//! Key/value sources the engine fetches from.
//!
//! Every backend implements [`StoreClient`]. The [`BackendRegistry`] maps
//! the configured backend name to a constructor.

pub mod env;
pub mod error;
pub mod file;
pub mod registry;
pub mod tree;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::shutdown::Shutdown;

pub use env::EnvClient;
pub use error::{BackendError, Result};
pub use file::FileClient;
pub use registry::{BackendFactory, BackendRegistry};
pub use tree::{flatten, ListIndex};

/// Contract every backend adapter satisfies.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetches every requested key and, for keys naming a container, all of
    /// its descendants, keyed by absolute path.
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    /// Blocks until something under `prefix`/`keys` changes, returning a
    /// token different from `wait_index`. A `wait_index` of zero returns a
    /// non-zero token immediately. Returns once `shutdown` fires; callers
    /// must check the signal before acting on the token.
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        wait_index: u64,
        shutdown: &mut Shutdown,
    ) -> Result<u64>;
}
