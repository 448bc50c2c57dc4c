//! Mock container runtime for testing

use super::{ContainerRuntime, ContainerState};
use async_trait::async_trait;
use sandbox_registry_core::RegistryError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Record of runtime queries for test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Inspect(String),
}

#[derive(Debug, Default)]
struct MockRuntimeState {
    containers: HashMap<String, ContainerState>,
    error: Option<String>,
}

/// Mock runtime. Unknown containers report [`ContainerState::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct MockContainerRuntime {
    state: Arc<Mutex<MockRuntimeState>>,
    /// Track calls for verification
    pub call_log: Arc<Mutex<Vec<RuntimeCall>>>,
}

impl MockContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what `inspect` reports for `container_id`.
    pub fn set_state(&self, container_id: &str, state: ContainerState) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(container_id.to_string(), state);
    }

    /// Mark `container_id` as running.
    pub fn set_running(&self, container_id: &str) {
        self.set_state(container_id, ContainerState::Running);
    }

    /// Forget `container_id` entirely.
    pub fn remove(&self, container_id: &str) {
        self.state.lock().unwrap().containers.remove(container_id);
    }

    /// Make every query fail with `message` (or stop failing with `None`).
    pub fn set_error(&self, message: Option<&str>) {
        self.state.lock().unwrap().error = message.map(str::to_string);
    }

    /// Get a copy of the call log for assertions
    pub fn get_calls(&self) -> Vec<RuntimeCall> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RegistryError> {
        self.call_log
            .lock()
            .unwrap()
            .push(RuntimeCall::Inspect(container_id.to_string()));

        let state = self.state.lock().unwrap();
        if let Some(message) = &state.error {
            return Err(RegistryError::runtime_query(container_id, message.clone()));
        }
        Ok(state
            .containers
            .get(container_id)
            .cloned()
            .unwrap_or(ContainerState::NotFound))
    }

    fn runtime_name(&self) -> &str {
        "mock"
    }
}
