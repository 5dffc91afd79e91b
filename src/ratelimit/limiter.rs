//! Fixed-window limiter over the shared store.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{Decision, Policy, PolicyName, RateLimitError};
use crate::activity::{ActivityEvent, ActivityLogger, Origin, Outcome};
use crate::config::{RateLimitConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::store::{with_deadline, SharedStore, StoreError, WindowCount};

/// Evaluates policies against counters in the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    key_prefix: Arc<str>,
    deadline: Duration,
    enabled: bool,
    activity: ActivityLogger,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn SharedStore>,
        config: &RateLimitConfig,
        timeouts: &TimeoutConfig,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            store,
            key_prefix: Arc::from(config.key_prefix.as_str()),
            deadline: Duration::from_millis(timeouts.store_ms),
            enabled: config.enabled,
            activity,
        }
    }

    /// `<prefix>:<policy>:<subject>`
    pub fn counter_key(&self, policy: PolicyName, subject: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, policy, subject)
    }

    /// Count one hit for `subject` under `policy` with the given limit.
    pub async fn check(&self, subject: &str, policy: &Policy, limit: u64) -> Result<Decision, RateLimitError> {
        self.check_for(subject, policy, limit, &Origin::default()).await
    }

    /// As [`check`](Self::check), attributing the activity event to `origin`.
    pub async fn check_for(
        &self,
        subject: &str,
        policy: &Policy,
        limit: u64,
        origin: &Origin,
    ) -> Result<Decision, RateLimitError> {
        if !self.enabled {
            return Ok(Decision::uncounted(limit, policy.window, false));
        }

        let key = self.counter_key(policy.name, subject);
        let action = format!("rate_limit:{}", policy.name);

        let counted = with_deadline("incr_window", self.deadline, self.store.incr_window(&key, policy.window)).await;

        match counted {
            Ok(WindowCount { count, ttl }) => {
                let decision = Decision::counted(count, limit, ttl);
                if decision.allowed {
                    metrics::record_rate_limit_decision(policy.name.as_str(), "allowed");
                    self.activity.record(
                        ActivityEvent::new(action, Outcome::Allowed)
                            .with_origin(origin)
                            .with_key(key)
                            .with_decision(decision),
                    );
                    Ok(decision)
                } else {
                    warn!(policy = %policy.name, key = %key, count, limit, "Rate limit exceeded");
                    metrics::record_rate_limit_decision(policy.name.as_str(), "rejected");
                    self.activity.record(
                        ActivityEvent::new(action, Outcome::RateLimited)
                            .with_origin(origin)
                            .with_key(key)
                            .with_decision(decision),
                    );
                    Err(RateLimitError::Exceeded {
                        policy: policy.name,
                        message: policy.message.clone(),
                        decision,
                    })
                }
            }
            Err(e) => {
                warn!(policy = %policy.name, key = %key, error = %e, "Rate limit store failure, allowing request");
                metrics::record_rate_limit_decision(policy.name.as_str(), "degraded");
                let decision = Decision::uncounted(limit, policy.window, true);
                self.activity.record(
                    ActivityEvent::new(action, Outcome::Degraded)
                        .with_origin(origin)
                        .with_key(key)
                        .with_decision(decision),
                );
                Ok(decision)
            }
        }
    }

    /// Delete the counter for `subject` under `policy`.
    pub async fn reset(&self, policy: PolicyName, subject: &str) -> Result<bool, StoreError> {
        let key = self.counter_key(policy, subject);
        let removed = with_deadline("reset", self.deadline, self.store.delete(&key)).await?;
        tracing::info!(key = %key, removed, "Rate limit counter reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::*;
    use crate::activity::MemorySink;
    use crate::ratelimit::PolicySet;
    use crate::store::MemoryStore;

    struct StalledStore;

    #[async_trait]
    impl SharedStore for StalledStore {
        async fn incr_window(&self, _: &str, _: Duration) -> Result<WindowCount, StoreError> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn bump(&self, _: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn set_ex_if(&self, _: &str, _: &str, _: Duration, _: &str, _: u64) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }
        fn backend(&self) -> &'static str {
            "stalled"
        }
    }

    fn limiter(store: Arc<dyn SharedStore>, activity: ActivityLogger) -> RateLimiter {
        RateLimiter::new(store, &RateLimitConfig::default(), &TimeoutConfig::default(), activity)
    }

    #[tokio::test]
    async fn rejects_after_max_in_window() {
        let limiter = limiter(Arc::new(MemoryStore::new()), ActivityLogger::disabled());
        let strict = PolicySet::default().get(PolicyName::Strict);

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("10.0.0.1", &strict, strict.max).await.unwrap();
            assert_eq!(decision.remaining, expected_remaining);
        }

        let err = limiter.check("10.0.0.1", &strict, strict.max).await.unwrap_err();
        let RateLimitError::Exceeded { policy, decision, .. } = err;
        assert_eq!(policy, PolicyName::Strict);
        assert!(!decision.allowed);

        // Other subjects have their own counters.
        assert!(limiter.check("10.0.0.2", &strict, strict.max).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn window_restarts_after_expiry() {
        let limiter = limiter(Arc::new(MemoryStore::new()), ActivityLogger::disabled());
        let search = PolicySet::default().get(PolicyName::Search);

        for _ in 0..search.max {
            limiter.check("10.0.0.1", &search, search.max).await.unwrap();
        }
        assert!(limiter.check("10.0.0.1", &search, search.max).await.is_err());

        tokio::time::advance(search.window + Duration::from_millis(1)).await;
        let decision = limiter.check("10.0.0.1", &search, search.max).await.unwrap();
        assert_eq!(decision.remaining, search.max - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_fails_open_and_records_degraded() {
        let sink = Arc::new(MemorySink::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (activity, worker) = ActivityLogger::spawn(sink.clone(), 8, shutdown_rx);
        let limiter = limiter(Arc::new(StalledStore), activity);
        let strict = PolicySet::default().get(PolicyName::Strict);

        for _ in 0..10 {
            let decision = limiter.check("10.0.0.1", &strict, strict.max).await.unwrap();
            assert!(decision.allowed);
            assert!(decision.degraded);
        }

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
        let events = sink.events().await;
        assert_eq!(events.len(), 10);
        assert!(events.iter().all(|e| e.outcome == Outcome::Degraded));
        assert_eq!(events[0].key.as_deref(), Some("rl:strict:10.0.0.1"));
    }

    #[tokio::test]
    async fn reset_clears_counter() {
        let limiter = limiter(Arc::new(MemoryStore::new()), ActivityLogger::disabled());
        let strict = PolicySet::default().get(PolicyName::Strict);
        for _ in 0..6 {
            let _ = limiter.check("a@x.com", &strict, strict.max).await;
        }
        assert!(limiter.reset(PolicyName::Strict, "a@x.com").await.unwrap());
        assert!(limiter.check("a@x.com", &strict, strict.max).await.is_ok());
    }

    #[tokio::test]
    async fn disabled_limiter_never_counts() {
        let store = Arc::new(MemoryStore::new());
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(store.clone(), &config, &TimeoutConfig::default(), ActivityLogger::disabled());
        let strict = PolicySet::default().get(PolicyName::Strict);
        for _ in 0..20 {
            assert!(limiter.check("10.0.0.1", &strict, strict.max).await.is_ok());
        }
        assert!(store.is_empty());
    }
}
