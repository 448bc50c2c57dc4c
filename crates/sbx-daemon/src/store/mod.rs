//! Shared state store abstraction
//!
//! The registry persists connections as plain string keys and its indexes as
//! hashes. Any store offering those two shapes plus a TTL'd "set if absent"
//! can back it. Implementations include Redis (production) and an in-memory
//! map (tests, single-process use).

use async_trait::async_trait;
use sandbox_registry_core::RegistryError;
use std::sync::Arc;

mod memory;
mod redis_store;

pub use self::memory::MemoryStateStore;
pub use self::redis_store::RedisStateStore;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Key/value + hash storage reachable from every backend process.
///
/// Writes are last-write-wins; implementations offer no compare-and-set
/// beyond [`StateStore::acquire_lease`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a string key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string key, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key of any type. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys matching a glob pattern (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Read one field of a hash.
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>>;

    /// Write one field of a hash.
    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<()>;

    /// Delete one field of a hash. Deleting a missing field succeeds.
    async fn hdel(&self, hash: &str, field: &str) -> Result<()>;

    /// Take or renew a TTL'd lease on `key` for `holder`.
    ///
    /// Returns `true` when `holder` owns the lease after the call. `now_ms`
    /// is the caller's clock; stores with native expiry may ignore it.
    async fn acquire_lease(&self, key: &str, holder: &str, ttl_ms: u64, now_ms: i64)
    -> Result<bool>;
}

/// Shared, thread-safe store handle.
pub type SharedStateStore = Arc<dyn StateStore>;
