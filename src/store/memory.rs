//! Process-local store backed by a sharded concurrent map.
//!
//! Counters are updated while holding the entry's shard lock, which makes
//! `incr_window` linearizable for every caller in this process. Guarded writes
//! and generation bumps additionally serialize on one fence so the guard check
//! and the write cannot interleave with a bump. Expired entries are invisible to
//! readers and are purged by the janitor task.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::{SharedStore, StoreError, WindowCount};

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// `None` for counters created by `bump`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory [`SharedStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    fence: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until shutdown.
    pub fn spawn_janitor(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = self.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = self.entries.len(), "Purged expired store entries");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Store janitor received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: Some(now + window),
        });
        let entry = slot.value_mut();
        let live = entry.is_live(now);

        let count = match entry.value {
            Value::Counter(ref mut count) if live => {
                *count += 1;
                *count
            }
            _ => {
                *entry = Entry {
                    value: Value::Counter(1),
                    expires_at: Some(now + window),
                };
                1
            }
        };

        Ok(WindowCount {
            count,
            ttl: entry
                .expires_at
                .map_or(window, |at| at.saturating_duration_since(now)),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(match &entry.value {
                    Value::Counter(count) => count.to_string(),
                    Value::Text(text) => text.clone(),
                }));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Text(value.to_owned()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn bump(&self, key: &str) -> Result<u64, StoreError> {
        let _fence = self.fence.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_owned()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        let entry = slot.value_mut();
        let live = entry.is_live(now);

        let value = match entry.value {
            Value::Counter(count) if live => count + 1,
            _ => 1,
        };
        *entry = Entry {
            value: Value::Counter(value),
            expires_at: None,
        };
        Ok(value)
    }

    async fn set_ex_if(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        guard: &str,
        expected: u64,
    ) -> Result<bool, StoreError> {
        let _fence = self.fence.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let current = match self.entries.get(guard) {
            Some(entry) if entry.is_live(now) => match entry.value {
                Value::Counter(count) => count,
                Value::Text(ref text) => text.parse().map_err(|_| {
                    StoreError::Protocol(format!("guard '{guard}' does not hold a counter"))
                })?,
            },
            _ => 0,
        };
        if current != expected {
            return Ok(false);
        }

        self.entries.insert(
            key.to_owned(),
            Entry {
                value: Value::Text(value.to_owned()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry.is_live(now))
            .unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_starts_on_first_hit_and_resets_after_expiry() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        let first = store.incr_window("rl:search:10.0.0.1", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.ttl, window);

        time::advance(Duration::from_secs(20)).await;
        let second = store.incr_window("rl:search:10.0.0.1", window).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.ttl, Duration::from_secs(40));

        time::advance(Duration::from_secs(41)).await;
        let fresh = store.incr_window("rl:search:10.0.0.1", window).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.ttl, window);
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire() {
        let store = MemoryStore::new();
        store.set_ex("session:1", "{}", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("session:1").await.unwrap().as_deref(), Some("{}"));

        time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("session:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = MemoryStore::new();
        store.set_ex("short", "v", Duration::from_secs(1)).await.unwrap();
        store.set_ex("long", "v", Duration::from_secs(100)).await.unwrap();
        time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bumped_counters_do_not_expire() {
        let store = MemoryStore::new();
        assert_eq!(store.bump("session-generation:1").await.unwrap(), 1);
        assert_eq!(store.bump("session-generation:1").await.unwrap(), 2);

        time::advance(Duration::from_secs(7 * 24 * 3600)).await;
        assert_eq!(store.purge_expired(), 0);
        assert_eq!(store.get("session-generation:1").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn guarded_write_only_lands_on_the_expected_generation() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        // A missing guard reads as generation zero.
        assert!(store.set_ex_if("session:1", "a", ttl, "gen:1", 0).await.unwrap());
        assert_eq!(store.get("session:1").await.unwrap().as_deref(), Some("a"));

        store.bump("gen:1").await.unwrap();
        assert!(!store.set_ex_if("session:1", "b", ttl, "gen:1", 0).await.unwrap());
        assert_eq!(store.get("session:1").await.unwrap().as_deref(), Some("a"));

        assert!(store.set_ex_if("session:1", "c", ttl, "gen:1", 1).await.unwrap());
        assert_eq!(store.get("session:1").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for _ in 0..64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.incr_window("hot", Duration::from_secs(60)).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let last = store.incr_window("hot", Duration::from_secs(60)).await.unwrap();
        assert_eq!(last.count, 64 * 50 + 1);
    }
}
