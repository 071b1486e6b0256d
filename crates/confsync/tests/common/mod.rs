//! Shared test utilities for confsync integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated confdir/template/destination directories
//! - `MockStoreClient`, an in-memory backend with controllable failures,
//!   blocking and change notifications

pub mod harness;
pub mod mock;

pub use harness::TestHarness;
pub use mock::MockStoreClient;

use std::time::Duration;

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
