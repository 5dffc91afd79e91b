use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{ActivityEvent, ActivitySink};
use crate::observability::metrics;

/// Fire-and-forget handle onto the activity channel.
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    tx: Option<mpsc::Sender<ActivityEvent>>,
}

impl ActivityLogger {
    /// Start the drain worker.
    ///
    /// The worker exits when every logger handle is dropped or when
    /// `shutdown` fires; in the latter case buffered events are written first.
    /// The join handle yields the number of events written.
    pub fn spawn(
        sink: Arc<dyn ActivitySink>,
        capacity: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::channel::<ActivityEvent>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut written = 0u64;
            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => match event {
                        Some(event) => {
                            sink.write(event).await;
                            written += 1;
                        }
                        None => break,
                    },
                    _ = shutdown.recv() => {
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            sink.write(event).await;
                            written += 1;
                        }
                        break;
                    }
                }
            }
            tracing::debug!(written, "Activity worker stopped");
            written
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// A logger that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue an event without waiting. Dropped and counted when the channel is full.
    pub fn record(&self, event: ActivityEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(event).is_err() {
            metrics::record_activity_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{MemorySink, Outcome};

    #[tokio::test]
    async fn drains_on_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (logger, worker) = ActivityLogger::spawn(sink.clone(), 16, shutdown_rx);

        for i in 0..5 {
            logger.record(ActivityEvent::new(format!("authenticate:{i}"), Outcome::Allowed));
        }
        shutdown_tx.send(()).unwrap();

        assert_eq!(worker.await.unwrap(), 5);
        assert_eq!(sink.len().await, 5);
    }

    #[tokio::test]
    async fn overflow_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(2);
        let logger = ActivityLogger { tx: Some(tx) };

        for _ in 0..10 {
            logger.record(ActivityEvent::new("authorize", Outcome::Denied(crate::error::ErrorKind::AdminRequired)));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[test]
    fn disabled_logger_is_inert() {
        ActivityLogger::disabled().record(ActivityEvent::new("authenticate", Outcome::Allowed));
    }
}
