use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Periodically reports a worker as alive to the coordinator.
pub struct HeartbeatSender {
    worker_id: String,
    interval: Duration,
}

impl HeartbeatSender {
    pub fn new(worker_id: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            worker_id: worker_id.into(),
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Send the worker id on `tx` every interval until cancelled or the
    /// coordinator goes away.
    pub async fn run(&self, tx: mpsc::Sender<String>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if tx.send(self.worker_id.clone()).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(worker_id = %self.worker_id, "Heartbeat sender stopped");
    }
}
