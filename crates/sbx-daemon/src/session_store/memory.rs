//! In-memory session store

use super::SessionStore;
use async_trait::async_trait;
use sandbox_registry_core::{RegistryError, SessionRecord, SessionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Session store backed by a map. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<Mutex<HashMap<String, SessionRecord>>>,
    fail_reads: Arc<AtomicBool>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: SessionRecord) {
        if let Ok(mut records) = self.lock() {
            records.insert(record.id.clone(), record);
        }
    }

    pub fn remove(&self, session_id: &str) {
        if let Ok(mut records) = self.lock() {
            records.remove(session_id);
        }
    }

    /// Current status of `session_id`, if present.
    pub fn status_of(&self, session_id: &str) -> Option<SessionStatus> {
        self.lock().ok()?.get(session_id).map(|r| r.status)
    }

    /// Make every `find_by_id` fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SessionRecord>>, RegistryError> {
        self.records
            .lock()
            .map_err(|_| RegistryError::session_store("memory session store mutex poisoned"))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RegistryError::session_store("simulated read failure"));
        }
        Ok(self.lock()?.get(session_id).cloned())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), RegistryError> {
        if let Some(record) = self.lock()?.get_mut(session_id) {
            record.status = status;
        }
        Ok(())
    }
}
