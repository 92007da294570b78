//! One-shot gate between the nodes list and the pending-pods list.
//!
//! A scheduler that sees pods to place before it knows any node marks them
//! unschedulable. The gate opens the first time the nodes list is served, and
//! the unassigned-pods list waits on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// A signal that fires once and stays open.
#[derive(Debug, Clone)]
pub struct FirstServeGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for FirstServeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl FirstServeGate {
    /// Create a closed gate.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate. Later calls are no-ops.
    pub fn open(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!("Nodes served, releasing pending-pod lists");
        }
    }

    /// Whether the gate has opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for the gate to open, up to `limit`. Returns whether it opened.
    pub async fn wait(&self, limit: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let opened = matches!(
            tokio::time::timeout(limit, rx.wait_for(|open| *open)).await,
            Ok(Ok(_))
        );
        opened
    }
}
