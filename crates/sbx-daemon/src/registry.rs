//! Container registry
//!
//! Maps a session id to the container serving it, in the shared state store,
//! so that any backend process can route tool requests to any sandbox.
//!
//! ## Layout
//!
//! - `containers:session:{id}` holds the encoded [`ContainerConnection`]
//! - `containers:index:containerToSession` maps container id back to session
//! - `containers:meta:failureCounts` / `containers:meta:nextCheckAfter` hold
//!   the supervisor's per-session failure tracking
//!
//! Writes are last-write-wins. Nothing here locks across processes.

use crate::session_store::SharedSessionStore;
use crate::store::SharedStateStore;
use crate::tool_client::SharedToolServerClient;
use chrono::{DateTime, Utc};
use sandbox_registry_core::codec::{decode_connection, encode_connection};
use sandbox_registry_core::keys::{
    CONTAINER_INDEX, FAILURE_COUNTS, NEXT_CHECK_AFTER, SESSION_KEY_PATTERN, session_id_from_key,
    session_key,
};
use sandbox_registry_core::{
    ContainerConnection, ContainerStatus, HealthStatus, RegistryError, SharedClock,
};
use tracing::{debug, info, warn};

/// Supervisor failure tracking for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    /// Consecutive failed probes since the last success
    pub failure_count: u32,
    /// Epoch millis before which the session must not be probed
    pub next_check_after: Option<i64>,
}

impl FailureState {
    /// `true` while `now_ms` is inside the deferral window.
    pub fn is_deferred(&self, now_ms: i64) -> bool {
        self.next_check_after.is_some_and(|until| now_ms < until)
    }
}

/// Outcome of reading one forward record.
enum Stored {
    Absent,
    Corrupt { container_id: Option<String> },
    Valid(ContainerConnection),
}

/// Registry of live sandbox container connections.
///
/// Cheap to clone; every clone talks to the same stores.
#[derive(Clone)]
pub struct ContainerRegistry {
    store: SharedStateStore,
    sessions: SharedSessionStore,
    tools: SharedToolServerClient,
    clock: SharedClock,
}

impl ContainerRegistry {
    pub fn new(
        store: SharedStateStore,
        sessions: SharedSessionStore,
        tools: SharedToolServerClient,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            sessions,
            tools,
            clock,
        }
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn sessions(&self) -> &SharedSessionStore {
        &self.sessions
    }

    pub fn tools(&self) -> &SharedToolServerClient {
        &self.tools
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Record that `container_id` now serves `session_id`.
    ///
    /// The connection starts as `starting` with `host` set to the container
    /// name. Any previous connection for the session is replaced; if it
    /// pointed at a different container, that container's index entry is
    /// dropped. If another session's record still routes to `container_id`,
    /// that session is unregistered first so at most one record routes to
    /// any container.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` when the session store has no such session. Session
    /// store and state store failures propagate.
    pub async fn register_container(
        &self,
        session_id: &str,
        container_id: &str,
        container_name: &str,
        tool_server_port: u16,
        dev_server_port: u16,
    ) -> Result<ContainerConnection, RegistryError> {
        let session = self.sessions.find_by_id(session_id).await?.ok_or_else(|| {
            RegistryError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;

        let previous = match self.read(session_id).await? {
            Stored::Valid(conn) => Some(conn.container_id),
            Stored::Corrupt { container_id } => container_id,
            Stored::Absent => None,
        };

        self.displace_other_owner(container_id, session_id).await?;

        let connection = ContainerConnection {
            session_id: session_id.to_string(),
            user_id: session.user_id,
            container_id: container_id.to_string(),
            container_name: container_name.to_string(),
            host: container_name.to_string(),
            tool_server_port,
            dev_server_port,
            status: ContainerStatus::Starting,
            registered_at: self.clock.now(),
            last_health_check: None,
            health_status: None,
        };

        self.write(&connection).await?;
        self.store
            .hset(CONTAINER_INDEX, container_id, session_id)
            .await?;

        if let Some(stale) = previous.filter(|prev| prev != container_id) {
            self.drop_index_entry(&stale, session_id).await?;
            debug!("Session {session_id} moved from container {stale} to {container_id}");
        }

        info!(
            "Registered container {} ({}) for session {}",
            container_id, container_name, session_id
        );
        Ok(connection)
    }

    /// Forget the connection for `session_id` along with its index entry and
    /// failure tracking. Never fails; store errors are logged.
    pub async fn unregister_container(&self, session_id: &str) {
        let container_id = match self.read(session_id).await {
            Ok(Stored::Valid(conn)) => Some(conn.container_id),
            Ok(Stored::Corrupt { container_id }) => container_id,
            Ok(Stored::Absent) => {
                debug!("Unregister: no connection for session {session_id}");
                None
            }
            Err(e) => {
                // Without the record the index entry cannot be found, so the
                // forward record stays for a later retry.
                warn!("Unregister: failed to read session {}: {}", session_id, e);
                return;
            }
        };

        if let Err(e) = self.store.delete(&session_key(session_id)).await {
            warn!("Unregister: failed to delete session {}: {}", session_id, e);
        }
        if let Some(container_id) = &container_id {
            if let Err(e) = self.drop_index_entry(container_id, session_id).await {
                warn!(
                    "Unregister: failed to drop index entry {}: {}",
                    container_id, e
                );
            }
        }
        if let Err(e) = self.clear_failures(session_id).await {
            warn!(
                "Unregister: failed to clear failure tracking for {}: {}",
                session_id, e
            );
        }

        if let Some(container_id) = container_id {
            info!("Unregistered container {container_id} for session {session_id}");
        }
    }

    /// Look up the connection for `session_id`.
    ///
    /// Undecodable records and records missing a routing field read as
    /// `None`; they are logged and left in place.
    pub async fn get_container_connection(
        &self,
        session_id: &str,
    ) -> Result<Option<ContainerConnection>, RegistryError> {
        match self.read(session_id).await? {
            Stored::Valid(conn) => Ok(Some(conn)),
            Stored::Corrupt { .. } | Stored::Absent => Ok(None),
        }
    }

    /// Reverse lookup through the container index.
    pub async fn get_session_for_container(
        &self,
        container_id: &str,
    ) -> Result<Option<String>, RegistryError> {
        self.store.hget(CONTAINER_INDEX, container_id).await
    }

    /// Overwrite the status of an existing connection.
    ///
    /// Returns `false` without writing when no usable connection exists.
    pub async fn update_container_status(
        &self,
        session_id: &str,
        status: ContainerStatus,
    ) -> Result<bool, RegistryError> {
        let Some(mut connection) = self.get_container_connection(session_id).await? else {
            debug!("Status update for unknown session {session_id} ignored");
            return Ok(false);
        };
        if connection.status != status {
            debug!(
                "Session {} status {} -> {}",
                session_id, connection.status, status
            );
        }
        connection.status = status;
        self.write(&connection).await?;
        Ok(true)
    }

    /// Every usable connection, oldest registration first.
    ///
    /// Scans all forward keys; cost grows with the number of live sessions.
    pub async fn get_all_containers(&self) -> Result<Vec<ContainerConnection>, RegistryError> {
        let keys = self.store.keys(SESSION_KEY_PATTERN).await?;
        let mut connections = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(session_id) = session_id_from_key(&key) else {
                continue;
            };
            if let Stored::Valid(conn) = self.read(session_id).await? {
                connections.push(conn);
            }
        }
        connections.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(connections)
    }

    /// Connections owned by `user_id`.
    pub async fn get_user_containers(
        &self,
        user_id: &str,
    ) -> Result<Vec<ContainerConnection>, RegistryError> {
        let mut all = self.get_all_containers().await?;
        all.retain(|c| c.user_id == user_id);
        Ok(all)
    }

    /// Forward an opaque operation to the session's tool server.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if no usable connection exists, `NotRunning` if the
    /// connection is not `running`. In both cases the tool server is not
    /// contacted. Transport failures surface as `ToolServer`.
    pub async fn send_tool_request(
        &self,
        session_id: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, RegistryError> {
        let connection = self
            .get_container_connection(session_id)
            .await?
            .ok_or_else(|| RegistryError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;

        if !connection.is_running() {
            return Err(RegistryError::NotRunning {
                session_id: session_id.to_string(),
                status: connection.status,
            });
        }

        self.tools.forward(&connection, request).await
    }

    /// Persist a successful probe. No-op when the connection is gone.
    pub async fn record_health(
        &self,
        session_id: &str,
        health: HealthStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let Some(mut connection) = self.get_container_connection(session_id).await? else {
            return Ok(false);
        };
        connection.last_health_check = Some(at);
        connection.health_status = Some(health);
        self.write(&connection).await?;
        Ok(true)
    }

    /// Current failure tracking for `session_id`.
    ///
    /// Unparseable values read as absent.
    pub async fn failure_state(&self, session_id: &str) -> Result<FailureState, RegistryError> {
        let count = self.store.hget(FAILURE_COUNTS, session_id).await?;
        let next = self.store.hget(NEXT_CHECK_AFTER, session_id).await?;

        let failure_count = match count.as_deref().map(str::parse::<u32>) {
            Some(Ok(n)) => n,
            Some(Err(_)) => {
                warn!("Ignoring unparseable failure count for session {session_id}");
                0
            }
            None => 0,
        };
        let next_check_after = next.as_deref().and_then(|v| v.parse::<i64>().ok());

        Ok(FailureState {
            failure_count,
            next_check_after,
        })
    }

    /// Store a failure count and the deadline before the next probe.
    pub async fn record_failure(
        &self,
        session_id: &str,
        failure_count: u32,
        next_check_after: i64,
    ) -> Result<(), RegistryError> {
        self.store
            .hset(FAILURE_COUNTS, session_id, &failure_count.to_string())
            .await?;
        self.store
            .hset(NEXT_CHECK_AFTER, session_id, &next_check_after.to_string())
            .await
    }

    /// Drop failure count and deferral for `session_id`.
    pub async fn clear_failures(&self, session_id: &str) -> Result<(), RegistryError> {
        self.store.hdel(FAILURE_COUNTS, session_id).await?;
        self.store.hdel(NEXT_CHECK_AFTER, session_id).await
    }

    async fn read(&self, session_id: &str) -> Result<Stored, RegistryError> {
        let Some(raw) = self.store.get(&session_key(session_id)).await? else {
            return Ok(Stored::Absent);
        };
        match decode_connection(&raw) {
            Ok(conn) => Ok(Stored::Valid(conn)),
            Err(e) => {
                warn!("Corrupt connection record for session {}: {}", session_id, e);
                Ok(Stored::Corrupt {
                    container_id: salvage_container_id(&raw),
                })
            }
        }
    }

    async fn write(&self, connection: &ContainerConnection) -> Result<(), RegistryError> {
        let encoded = encode_connection(connection)?;
        self.store
            .set(&session_key(&connection.session_id), &encoded)
            .await
    }

    /// Unregister the session the index names for `container_id` when it is
    /// not `session_id` and its record still routes to that container.
    async fn displace_other_owner(
        &self,
        container_id: &str,
        session_id: &str,
    ) -> Result<(), RegistryError> {
        let Some(owner) = self.store.hget(CONTAINER_INDEX, container_id).await? else {
            return Ok(());
        };
        if owner == session_id {
            return Ok(());
        }
        let still_routed = match self.read(&owner).await? {
            Stored::Valid(conn) => conn.container_id == container_id,
            Stored::Corrupt { container_id: salvaged } => {
                salvaged.as_deref() == Some(container_id)
            }
            Stored::Absent => false,
        };
        if still_routed {
            warn!(
                "Container {} reassigned from session {} to {}; unregistering {}",
                container_id, owner, session_id, owner
            );
            self.unregister_container(&owner).await;
        }
        Ok(())
    }

    /// Remove `container_id` from the index if it still points at
    /// `session_id`.
    async fn drop_index_entry(
        &self,
        container_id: &str,
        session_id: &str,
    ) -> Result<(), RegistryError> {
        let owner = self.store.hget(CONTAINER_INDEX, container_id).await?;
        if owner.as_deref() == Some(session_id) {
            self.store.hdel(CONTAINER_INDEX, container_id).await?;
        }
        Ok(())
    }
}

/// Best-effort container id from a record that failed to decode.
fn salvage_container_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("containerId")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salvage_container_id() {
        assert_eq!(
            salvage_container_id(r#"{"containerId":"c1","host":""}"#),
            Some("c1".to_string())
        );
        assert_eq!(salvage_container_id(r#"{"containerId":""}"#), None);
        assert_eq!(salvage_container_id("not json"), None);
    }

    #[test]
    fn test_failure_state_deferral() {
        let state = FailureState {
            failure_count: 1,
            next_check_after: Some(10_000),
        };
        assert!(state.is_deferred(9_999));
        assert!(!state.is_deferred(10_000));
        assert!(!FailureState::default().is_deferred(0));
    }
}
