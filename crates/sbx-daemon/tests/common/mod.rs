//! Shared fixtures: a registry wired to in-memory and mock collaborators.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sandbox_registry_core::config::SupervisorConfig;
use sandbox_registry_core::{
    Clock, ContainerConnection, ContainerStatus, ManualClock, SessionRecord, SessionStatus,
};
use sandbox_registry_daemon::registry::ContainerRegistry;
use sandbox_registry_daemon::runtime::MockContainerRuntime;
use sandbox_registry_daemon::session_store::MemorySessionStore;
use sandbox_registry_daemon::store::MemoryStateStore;
use sandbox_registry_daemon::supervisor::HealthSupervisor;
use sandbox_registry_daemon::tool_client::MockToolServerClient;
use std::sync::Arc;

/// 2026-03-01T12:00:00.123Z
pub const START_MILLIS: i64 = 1_772_366_400_123;

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(START_MILLIS).unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryStateStore>,
    pub sessions: MemorySessionStore,
    pub tools: MockToolServerClient,
    pub runtime: MockContainerRuntime,
    pub clock: Arc<ManualClock>,
    pub registry: ContainerRegistry,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStateStore::new());
        let sessions = MemorySessionStore::new();
        let tools = MockToolServerClient::new();
        let runtime = MockContainerRuntime::new();
        let clock = Arc::new(ManualClock::new(start_time()));
        let registry = ContainerRegistry::new(
            store.clone(),
            Arc::new(sessions.clone()),
            Arc::new(tools.clone()),
            clock.clone(),
        );
        Self {
            store,
            sessions,
            tools,
            runtime,
            clock,
            registry,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn add_session(&self, session_id: &str, user_id: &str) {
        self.sessions
            .insert(SessionRecord::new(session_id, user_id, SessionStatus::Running));
    }

    /// Register `container_id` for a fresh session and mark it running.
    pub async fn register_running(&self, session_id: &str, container_id: &str) -> ContainerConnection {
        self.add_session(session_id, "user-1");
        self.runtime.set_running(container_id);
        self.registry
            .register_container(
                session_id,
                container_id,
                &format!("sandbox-{session_id}"),
                4000,
                3000,
            )
            .await
            .unwrap();
        assert!(
            self.registry
                .update_container_status(session_id, ContainerStatus::Running)
                .await
                .unwrap()
        );
        self.registry
            .get_container_connection(session_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn supervisor(&self) -> HealthSupervisor {
        self.supervisor_with(&SupervisorConfig::default())
    }

    pub fn supervisor_with(&self, config: &SupervisorConfig) -> HealthSupervisor {
        HealthSupervisor::new(
            self.registry.clone(),
            Arc::new(self.runtime.clone()),
            config,
        )
    }
}
