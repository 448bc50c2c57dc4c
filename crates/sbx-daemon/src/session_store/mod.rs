//! Durable session record store
//!
//! Owns the logical lifecycle of a sandbox session. The registry reads it to
//! validate registrations; the supervisor reads it every tick and writes
//! `stopped` when it evicts a dead container.

use async_trait::async_trait;
use sandbox_registry_core::{RegistryError, SessionRecord, SessionStatus};
use std::sync::Arc;

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PostgresSessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id. `Ok(None)` when no row exists.
    async fn find_by_id(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError>;

    /// Overwrite the lifecycle status of a session. Updating a missing
    /// session succeeds without effect.
    async fn update_status(&self, session_id: &str, status: SessionStatus)
    -> Result<(), RegistryError>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Stand-in for commands that only touch the shared state store. Every call
/// fails with a session store error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSessionStore;

#[async_trait]
impl SessionStore for DetachedSessionStore {
    async fn find_by_id(&self, _session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        Err(RegistryError::session_store("session store not connected"))
    }

    async fn update_status(
        &self,
        _session_id: &str,
        _status: SessionStatus,
    ) -> Result<(), RegistryError> {
        Err(RegistryError::session_store("session store not connected"))
    }
}
