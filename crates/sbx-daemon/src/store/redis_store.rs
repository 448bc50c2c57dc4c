//! Redis-backed state store.
//!
//! Uses a `ConnectionManager`, which multiplexes commands over one
//! connection and reconnects transparently after a drop.

use super::{Result, StateStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sandbox_registry_core::RegistryError;
use tracing::debug;

const SCAN_BATCH: usize = 200;

/// [`StateStore`] on top of a Redis server.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore").finish_non_exhaustive()
    }
}

impl RedisStateStore {
    /// Connect to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Store` if the URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| redis_error("open", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("connect", e))?;
        debug!("Connected to redis state store");
        Ok(Self { conn })
    }
}

fn redis_error(operation: &str, err: redis::RedisError) -> RegistryError {
    RegistryError::store(format!("redis {operation} failed: {err}"))
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| redis_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("SET", e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("DEL", e))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("SCAN", e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("HGET")
            .arg(hash)
            .arg(field)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| redis_error("HGET", e))
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(hash)
            .arg(field)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("HSET", e))
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("HDEL")
            .arg(hash)
            .arg(field)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("HDEL", e))
    }

    async fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl_ms: u64,
        _now_ms: i64,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("SET NX", e))?;
        if created.is_some() {
            return Ok(true);
        }

        // Not racing-safe across GET/PEXPIRE; a holder that loses the lease
        // between the two calls keeps probing for at most one more tick.
        let current: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("GET", e))?;
        if current.as_deref() != Some(holder) {
            return Ok(false);
        }

        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error("PEXPIRE", e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = RedisStateStore::connect("definitely not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Store { .. }));
        assert!(err.to_string().contains("redis open failed"));
    }
}
