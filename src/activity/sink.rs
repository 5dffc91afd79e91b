//! Activity sinks.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ActivityEvent, Outcome};

/// Destination for drained activity events.
#[async_trait]
pub trait ActivitySink: Send + Sync + 'static {
    async fn write(&self, event: ActivityEvent);
}

/// Writes events to the `activity` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ActivitySink for TracingSink {
    async fn write(&self, event: ActivityEvent) {
        let request_id = event.request_id.as_deref().unwrap_or("-");
        let principal_id = event.principal_id.as_ref().map(|id| id.as_str()).unwrap_or("-");
        let key = event.key.as_deref().unwrap_or("-");
        let remaining = event.decision.as_ref().map(|d| d.remaining);

        match event.outcome {
            Outcome::Allowed => tracing::debug!(
                target: "activity",
                request_id,
                principal_id,
                action = %event.action,
                key,
                remaining = ?remaining,
                at = event.at,
                "allowed"
            ),
            Outcome::Denied(kind) => tracing::info!(
                target: "activity",
                request_id,
                principal_id,
                action = %event.action,
                kind = kind.as_str(),
                at = event.at,
                "denied"
            ),
            Outcome::RateLimited => tracing::info!(
                target: "activity",
                request_id,
                principal_id,
                action = %event.action,
                key,
                at = event.at,
                "rate limited"
            ),
            Outcome::Degraded => tracing::warn!(
                target: "activity",
                request_id,
                principal_id,
                action = %event.action,
                key,
                at = event.at,
                "degraded"
            ),
        }
    }
}

/// Keeps events in memory for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl ActivitySink for MemorySink {
    async fn write(&self, event: ActivityEvent) {
        self.events.lock().await.push(event);
    }
}
