//! Read-through session cache of principal snapshots.
//!
//! Entries live in the shared store under `<prefix>:<principal id>`. A snapshot
//! may be stale by at most the TTL, and not at all after `invalidate`. With a
//! shared backend every instance sees the invalidation.
//!
//! Each principal also has a generation counter under
//! `<prefix>-generation:<principal id>`. `invalidate` bumps it before deleting
//! the snapshot, and a fill is written only if the generation read before the
//! principal lookup is still current. A lookup that raced an invalidation can
//! therefore never repopulate the cache with what it read.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::token::unix_now;
use super::{AuthError, Principal, PrincipalId, PrincipalStore};
use crate::config::{SessionConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::store::{with_deadline, SharedStore};

#[derive(Debug, Serialize, Deserialize)]
struct SessionEntry {
    principal: Principal,
    cached_at: u64,
}

/// Resolves principal ids to live principal snapshots.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SharedStore>,
    principals: Arc<dyn PrincipalStore>,
    ttl: Duration,
    key_prefix: Arc<str>,
    store_deadline: Duration,
    lookup_deadline: Duration,
}

impl SessionCache {
    pub fn new(
        store: Arc<dyn SharedStore>,
        principals: Arc<dyn PrincipalStore>,
        config: &SessionConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            store,
            principals,
            ttl: Duration::from_secs(config.ttl_secs),
            key_prefix: Arc::from(config.key_prefix.as_str()),
            store_deadline: Duration::from_millis(timeouts.store_ms),
            lookup_deadline: Duration::from_millis(timeouts.principal_lookup_ms),
        }
    }

    /// The principal store this cache reads through to.
    pub fn principals(&self) -> &Arc<dyn PrincipalStore> {
        &self.principals
    }

    fn key(&self, id: &PrincipalId) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    fn generation_key(&self, id: &PrincipalId) -> String {
        format!("{}-generation:{}", self.key_prefix, id)
    }

    /// Current generation for `id`, or `None` if it cannot be read. Without a
    /// generation the fill is skipped.
    async fn generation(&self, id: &PrincipalId) -> Option<u64> {
        let key = self.generation_key(id);
        match with_deadline("session_generation", self.store_deadline, self.store.get(&key)).await {
            Ok(None) => Some(0),
            Ok(Some(raw)) => match raw.parse() {
                Ok(generation) => Some(generation),
                Err(_) => {
                    warn!(principal_id = %id, "Unreadable session generation, not caching");
                    None
                }
            },
            Err(_) => None,
        }
    }

    /// Return the live principal for `id`.
    ///
    /// A cache that cannot be reached is bypassed; a principal store that
    /// cannot be reached rejects the request.
    pub async fn resolve(&self, id: &PrincipalId) -> Result<Principal, AuthError> {
        let key = self.key(id);

        match with_deadline("session_get", self.store_deadline, self.store.get(&key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<SessionEntry>(&raw) {
                Ok(entry) if entry.principal.id == *id && entry.principal.is_active => {
                    metrics::record_session_cache("hit");
                    return Ok(entry.principal);
                }
                Ok(_) | Err(_) => {
                    warn!(principal_id = %id, "Discarding unusable session entry");
                    let _ = with_deadline("session_delete", self.store_deadline, self.store.delete(&key)).await;
                    metrics::record_session_cache("corrupt");
                }
            },
            Ok(None) => metrics::record_session_cache("miss"),
            Err(e) => {
                warn!(principal_id = %id, error = %e, "Session cache unreachable, reading principal store directly");
                metrics::record_session_cache("bypass");
            }
        }

        let generation = self.generation(id).await;
        let principal = match tokio::time::timeout(self.lookup_deadline, self.principals.find_by_id(id)).await {
            Ok(Ok(found)) => found.ok_or(AuthError::UserNotFound)?,
            Ok(Err(e)) => return Err(AuthError::Unavailable(e.to_string())),
            Err(_) => return Err(AuthError::Unavailable("principal lookup timed out".into())),
        };

        if !principal.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        if let Some(generation) = generation {
            self.store_snapshot(&key, generation, &principal).await;
        }
        Ok(principal)
    }

    async fn store_snapshot(&self, key: &str, generation: u64, principal: &Principal) {
        let entry = SessionEntry {
            principal: principal.clone(),
            cached_at: unix_now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode session entry");
                return;
            }
        };
        let guard = self.generation_key(&principal.id);
        let write = self.store.set_ex_if(key, &raw, self.ttl, &guard, generation);
        match with_deadline("session_set", self.store_deadline, write).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(principal_id = %principal.id, generation, "Session invalidated during lookup, not caching");
                metrics::record_session_cache("stale_fill");
            }
            Err(e) => warn!(principal_id = %principal.id, error = %e, "Failed to cache session"),
        }
    }

    /// Drop the cached snapshot for `id` and fence off fills already in flight.
    ///
    /// Called on logout, password change, role change, deactivation and
    /// deletion. Failure is returned to the caller.
    pub async fn invalidate(&self, id: &PrincipalId) -> Result<bool, AuthError> {
        let guard = self.generation_key(id);
        let generation = with_deadline("session_generation", self.store_deadline, self.store.bump(&guard))
            .await
            .map_err(AuthError::Session)?;
        let removed = with_deadline("session_delete", self.store_deadline, self.store.delete(&self.key(id)))
            .await
            .map_err(AuthError::Session)?;
        debug!(principal_id = %id, removed, generation, "Session invalidated");
        Ok(removed)
    }
}
