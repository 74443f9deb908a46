//! Stop coordination for the reactor.

use std::sync::Arc;

use tokio::sync::watch;

/// Coordinator for stopping the reactor.
///
/// Backed by a watch channel so a trigger that happens before `run()` starts
/// waiting is not lost. Cheap to clone and `Send`, so other threads (signal
/// handlers, tests) can hold one.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the stop signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the stop signal has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
