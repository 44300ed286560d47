//! Shutdown signalling shared by long-running loops

use tokio::sync::broadcast;
use tracing::info;

/// Shutdown signal receiver
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Broadcasts a single shutdown signal to every subscriber
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown broadcaster
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a shutdown receiver
    pub fn subscribe(&self) -> ShutdownReceiver {
        self.tx.subscribe()
    }

    /// Signal shutdown to all subscribers
    pub fn trigger(&self) {
        info!("Initiating shutdown");
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` fires or its sender is gone
pub async fn wait_for(rx: &mut ShutdownReceiver) {
    let _ = rx.recv().await;
}
