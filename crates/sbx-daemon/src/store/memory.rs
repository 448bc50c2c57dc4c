//! In-process state store.
//!
//! Backs the registry in tests and in single-process deployments where
//! cross-process routing is not needed. Lease expiry is evaluated against the
//! `now_ms` passed by the caller, so a `ManualClock` controls it.

use super::{Result, StateStore};
use async_trait::async_trait;
use globset::Glob;
use sandbox_registry_core::RegistryError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct MemoryInner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    leases: HashMap<String, (String, i64)>,
}

/// `HashMap`-backed [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<MemoryInner>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a store error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `get` fail with a store error until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of fields in `hash` (0 if absent).
    pub fn hash_len(&self, hash: &str) -> usize {
        self.lock()
            .map(|inner| inner.hashes.get(hash).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Number of string keys.
    pub fn key_count(&self) -> usize {
        self.lock().map(|inner| inner.strings.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| RegistryError::store("memory store mutex poisoned"))
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RegistryError::store("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RegistryError::store("injected read failure"));
        }
        Ok(self.lock()?.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.lock()?
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock()?;
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.leases.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| RegistryError::store(format!("invalid key pattern '{pattern}': {e}")))?
            .compile_matcher();
        let inner = self.lock()?;
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.hashes.keys())
            .filter(|key| matcher.is_match(key.as_str()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .hashes
            .get(hash)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.lock()?
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hdel(&self, hash: &str, field: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.lock()?;
        if let Some(fields) = inner.hashes.get_mut(hash) {
            fields.remove(field);
            if fields.is_empty() {
                inner.hashes.remove(hash);
            }
        }
        Ok(())
    }

    async fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl_ms: u64,
        now_ms: i64,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut inner = self.lock()?;
        let expires_at = now_ms.saturating_add(i64::try_from(ttl_ms).unwrap_or(i64::MAX));
        let acquired = match inner.leases.get(key) {
            Some((current, deadline)) if current != holder && *deadline > now_ms => false,
            _ => true,
        };
        if acquired {
            inner
                .leases
                .insert(key.to_string(), (holder.to_string(), expires_at));
        }
        Ok(acquired)
    }
}
