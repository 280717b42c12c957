//! Redis-backed store for limits shared across processes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::error::{FloodgateError, Result};
use crate::ratelimit::Store;

/// Increments the counter only while the key exists. A bare `INCR` on an
/// expired key would recreate it with no TTL and lock the key forever.
const INCREMENT_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCR', KEYS[1])
end
return false
"#;

/// A [`Store`] keeping windows in Redis.
///
/// Windows are plain integer keys with an `EX` expiry, so Redis enforces the
/// window boundary. The connection manager multiplexes commands from all
/// tasks over one connection and reconnects after failures.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    increment: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn))
    }

    /// Use an already established connection manager.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            increment: Script::new(INCREMENT_IF_EXISTS),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl = u64::try_from(ttl_secs.max(1)).unwrap_or(1);
        let _: () = conn.set_ex(key, 0u64, ttl).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        value.ok_or_else(|| FloodgateError::NoSuchKey(key.to_string()))
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = self.increment.key(key).invoke_async(&mut conn).await?;
        value.ok_or_else(|| FloodgateError::NoSuchKey(key.to_string()))
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        // -2 when the key is missing, -1 when it has no expiry.
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;
        Ok(ttl)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
