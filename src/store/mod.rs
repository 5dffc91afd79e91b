//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! ratelimit::limiter ──incr_window──▶ ┌──────────────┐
//!                                      │ SharedStore  │──▶ memory.rs (DashMap, per process)
//! auth::session ──get/set_ex_if/bump─▶ │   (trait)    │──▶ redis_store.rs (shared, cross-instance)
//!                                      └──────────────┘
//! ```
//!
//! # Design Decisions
//! - Only single-operation primitives are exposed; callers never read-modify-write
//! - The increment and the first-hit expiry are one atomic step on every backend
//! - A guarded write checks its guard key and writes in one atomic step
//! - Every call is bounded by a deadline (`with_deadline`)

pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::observability::metrics;

/// Errors raised by the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the deadline.
    #[error("store operation '{0}' timed out")]
    Timeout(&'static str),

    /// The store answered with something we cannot interpret.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// Result of an atomic window increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Post-increment count within the current window.
    pub count: u64,
    /// Time left until the window (and the counter) expires.
    pub ttl: Duration,
}

/// Shared, concurrently-accessed key-value store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment `key`, starting a window of `window` on the first hit.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increment a counter that never expires. Returns the new value.
    async fn bump(&self, key: &str) -> Result<u64, StoreError>;

    /// Write `value` with `ttl` only if the counter at `guard` still equals
    /// `expected` (a missing counter reads as 0). Returns whether it was written.
    async fn set_ex_if(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        guard: &str,
        expected: u64,
    ) -> Result<bool, StoreError>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs and status output.
    fn backend(&self) -> &'static str;
}

/// A connected backend plus its background task, if any.
pub struct ConnectedStore {
    pub store: Arc<dyn SharedStore>,
    /// Expiry sweeper for the memory backend.
    pub janitor: Option<JoinHandle<()>>,
}

/// Connect the configured backend.
///
/// The memory backend gets a janitor that exits when `shutdown` fires; the
/// redis backend is pinged before it is returned.
pub async fn connect(
    config: &StoreConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<ConnectedStore, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using process-local memory store");
            let store = Arc::new(MemoryStore::new());
            let janitor = store
                .clone()
                .spawn_janitor(Duration::from_secs(config.sweep_interval_secs), shutdown);
            Ok(ConnectedStore {
                store,
                janitor: Some(janitor),
            })
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            tracing::info!(url = %redact_url(&config.redis_url), "Connected to redis store");
            Ok(ConnectedStore {
                store: Arc::new(store),
                janitor: None,
            })
        }
    }
}

/// Run a store future under a deadline, recording failures.
pub async fn with_deadline<T, F>(op: &'static str, deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let result = match tokio::time::timeout(deadline, fut).await {
        Ok(inner) => inner,
        Err(_) => Err(StoreError::Timeout(op)),
    };
    if result.is_err() {
        metrics::record_store_failure(op);
    }
    result
}

fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid>".to_string(),
    }
}
