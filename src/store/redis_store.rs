//! Redis-compatible shared store (Redis, Dragonfly, Valkey).
//!
//! The window increment and the guarded write run as server-side scripts so
//! that each is applied as one atomic operation.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, warn};

use super::{SharedStore, StoreError, WindowCount};

const INCR_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

const SET_EX_IF_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if (current or '0') ~= ARGV[3] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// [`SharedStore`] backed by a Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    incr_window: Script,
    set_ex_if: Script,
}

impl RedisStore {
    /// Connect and verify the server answers PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Failed to create redis client");
            StoreError::Unavailable(format!("invalid redis url: {e}"))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to create redis connection manager");
            StoreError::Unavailable(e.to_string())
        })?;

        let store = Self {
            connection_manager,
            incr_window: Script::new(INCR_WINDOW_SCRIPT),
            set_ex_if: Script::new(SET_EX_IF_SCRIPT),
        };
        store.ping().await?;
        debug!("Redis store answered PING");
        Ok(store)
    }
}

fn map_err(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Protocol(e.to_string())
    }
}

fn millis(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let mut conn = self.connection_manager.clone();
        let (count, ttl_ms): (u64, i64) = self
            .incr_window
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        Ok(WindowCount {
            count,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn bump(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("INCR")
            .arg(key)
            .query_async::<u64>(&mut conn)
            .await
            .map_err(map_err)
    }

    async fn set_ex_if(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        guard: &str,
        expected: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection_manager.clone();
        let written: i64 = self
            .set_ex_if
            .key(key)
            .key(guard)
            .arg(value)
            .arg(millis(ttl))
            .arg(expected.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(written == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection_manager.clone();
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
