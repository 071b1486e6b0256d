use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{report, ErrorSender, Processor};
use crate::shutdown::Shutdown;
use crate::template::TemplateResource;

/// Re-processes every resource, then sleeps for a fixed interval.
pub struct IntervalProcessor {
    resources: Vec<Arc<TemplateResource>>,
    interval: Duration,
    errors: ErrorSender,
    shutdown: Shutdown,
}

impl IntervalProcessor {
    pub fn new(
        resources: Vec<Arc<TemplateResource>>,
        interval: Duration,
        errors: ErrorSender,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            resources,
            interval,
            errors,
            shutdown,
        }
    }
}

#[async_trait]
impl Processor for IntervalProcessor {
    async fn process(&mut self) {
        log::info!(
            "Processing {} resources every {:?}",
            self.resources.len(),
            self.interval
        );

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            for resource in &self.resources {
                if let Err(e) = resource.process().await {
                    report(&self.errors, resource, e).await;
                }
            }

            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        log::info!("Interval processor stopped");
    }
}
