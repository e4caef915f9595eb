//! Shutdown coordination.

use std::time::Duration;
use tokio::sync::broadcast;

use crate::reconcile::HostStatusExecutor;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks subscribe to a broadcast channel and stop when it fires.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for background status checks to finish, at most `deadline`.
    pub async fn drain_executor(&self, executor: &HostStatusExecutor, deadline: Duration) {
        let pending = executor.in_flight();
        if pending == 0 {
            return;
        }
        tracing::info!(pending, deadline = ?deadline, "Draining host status tasks");
        if executor.drain(deadline).await {
            tracing::info!("Host status tasks drained");
        } else {
            tracing::warn!(
                remaining = executor.in_flight(),
                "Drain deadline reached, abandoning host status tasks"
            );
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_drain_executor_waits_for_tasks() {
        let shutdown = Shutdown::new();
        let executor = HostStatusExecutor::new(2);
        executor.spawn(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
        });

        shutdown.drain_executor(&executor, Duration::from_secs(2)).await;
        assert_eq!(executor.in_flight(), 0);
    }
}
