//! Cooperative shutdown for background tasks.

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Owner side: fires the shutdown for every cloned signal.
///
/// Dropping the trigger also counts as a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Hand out another signal tied to this trigger.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Task side: awaited alongside the task's real work in a `select!`.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered or the trigger dropped.
    pub async fn wait(&mut self) {
        // Err means the trigger is gone, which is a shutdown too
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
