//! Scheduling strategies that drive template resources.
//!
//! Both processors report failures onto a bounded error queue and stop when
//! the shared [`Shutdown`](crate::shutdown::Shutdown) signal fires.

pub mod interval;
pub mod watch;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::template::{ResourceError, TemplateResource};

pub use interval::IntervalProcessor;
pub use watch::WatchProcessor;

/// Number of errors buffered before processors wait for the reader.
pub const ERROR_QUEUE_CAPACITY: usize = 10;

/// A failed cycle of one resource.
#[derive(Debug)]
pub struct ProcessorError {
    pub dest: PathBuf,
    pub error: ResourceError,
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dest.display(), self.error)
    }
}

impl std::error::Error for ProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type ErrorSender = mpsc::Sender<ProcessorError>;
pub type ErrorReceiver = mpsc::Receiver<ProcessorError>;

/// Creates the error queue shared by a processor and its owner.
pub fn error_queue() -> (ErrorSender, ErrorReceiver) {
    mpsc::channel(ERROR_QUEUE_CAPACITY)
}

#[async_trait]
pub trait Processor: Send {
    /// Runs until shutdown is signalled.
    async fn process(&mut self);
}

/// Processes every resource once, in order. Returns how many failed.
pub async fn run_once(resources: &[Arc<TemplateResource>]) -> usize {
    let mut failures = 0;
    for resource in resources {
        if let Err(e) = resource.process().await {
            log::error!("{}: {}", resource.config().dest.display(), e);
            failures += 1;
        }
    }
    failures
}

pub(crate) async fn report(
    errors: &ErrorSender,
    resource: &TemplateResource,
    error: ResourceError,
) {
    let record = ProcessorError {
        dest: resource.config().dest.clone(),
        error,
    };
    if let Err(mpsc::error::SendError(record)) = errors.send(record).await {
        // Receiver dropped.
        log::error!("{}", record);
    }
}
