//! Snapshot of backend values exposed to templates.

pub mod keypath;
pub mod kv;

pub use kv::{KvPair, KvStore};
