//! Cooperative shutdown signal shared by processors and backends.

use tokio::sync::watch;

/// Write side of the shutdown signal. Dropping it also counts as shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Read side of the shutdown signal. Cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

/// Creates a linked trigger/listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

impl ShutdownTrigger {
    /// Signals every listener to stop.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Returns a new listener for this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Shutdown {
    /// True once shutdown was triggered or the trigger was dropped.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once shutdown has been triggered or the trigger was dropped.
    pub async fn wait(&mut self) {
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }
}
