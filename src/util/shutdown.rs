//! Graceful shutdown handling.

use tokio::sync::broadcast;

/// Fans a single shutdown notification out to every background task
/// (health probing, metrics server, summary logger).
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications.
    ///
    /// Only notifications sent after subscribing are observed, so tasks
    /// must subscribe before [`shutdown`](Self::shutdown) is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown. Returns the number of tasks notified.
    pub fn shutdown(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
