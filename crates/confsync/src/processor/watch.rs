use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::{report, ErrorSender, Processor};
use crate::shutdown::Shutdown;
use crate::template::{ResourceError, TemplateResource};

/// Pause after a failed watch before asking the backend again.
pub const WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Runs one task per resource that re-processes it whenever its backend
/// reports a change.
pub struct WatchProcessor {
    resources: Vec<Arc<TemplateResource>>,
    errors: ErrorSender,
    shutdown: Shutdown,
    backoff: Duration,
}

impl WatchProcessor {
    pub fn new(
        resources: Vec<Arc<TemplateResource>>,
        errors: ErrorSender,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            resources,
            errors,
            shutdown,
            backoff: WATCH_ERROR_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Processor for WatchProcessor {
    async fn process(&mut self) {
        log::info!("Watching {} resources", self.resources.len());

        let tasks = self.resources.iter().map(|resource| {
            tokio::spawn(monitor_prefix(
                Arc::clone(resource),
                self.errors.clone(),
                self.shutdown.clone(),
                self.backoff,
            ))
        });

        for result in join_all(tasks).await {
            if let Err(e) = result {
                log::error!("Watch task failed: {}", e);
            }
        }

        log::info!("Watch processor stopped");
    }
}

/// Watch loop for a single resource. A baseline watch from token zero comes
/// first so that changes made during the initial render are still seen; the
/// initial render happens even when that baseline fails.
async fn monitor_prefix(
    resource: Arc<TemplateResource>,
    errors: ErrorSender,
    mut shutdown: Shutdown,
    backoff: Duration,
) {
    let prefix = resource.config().prefix.clone();
    let keys = resource.config().prefixed_keys();

    let baseline = resource
        .client()
        .watch_prefix(&prefix, &keys, 0, &mut shutdown)
        .await;
    match baseline {
        Ok(index) => resource.set_last_index(index),
        Err(e) => report(&errors, &resource, ResourceError::from(e)).await,
    }

    if shutdown.is_triggered() {
        return;
    }
    if let Err(e) = resource.process().await {
        report(&errors, &resource, e).await;
    }

    loop {
        if shutdown.is_triggered() {
            return;
        }

        let watched = resource
            .client()
            .watch_prefix(&prefix, &keys, resource.last_index(), &mut shutdown)
            .await;

        if shutdown.is_triggered() {
            return;
        }

        match watched {
            Ok(index) => {
                resource.set_last_index(index);
                if let Err(e) = resource.process().await {
                    report(&errors, &resource, e).await;
                }
            }
            Err(e) => {
                report(&errors, &resource, ResourceError::from(e)).await;
                tokio::select! {
                    _ = shutdown.wait() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}
