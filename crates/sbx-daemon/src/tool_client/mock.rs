//! Mock tool-server client for testing

use super::{HealthReport, ToolServerClient};
use async_trait::async_trait;
use sandbox_registry_core::{ContainerConnection, RegistryError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Record of tool-server calls for test assertions
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Health { session_id: String },
    Forward { session_id: String, request: serde_json::Value },
}

type HealthResult = Result<HealthReport, String>;

#[derive(Debug)]
struct MockToolState {
    scripted_health: VecDeque<HealthResult>,
    default_health: HealthResult,
    response: Result<serde_json::Value, String>,
}

impl Default for MockToolState {
    fn default() -> Self {
        Self {
            scripted_health: VecDeque::new(),
            default_health: Ok(HealthReport::healthy()),
            response: Ok(serde_json::json!({ "success": true })),
        }
    }
}

/// Mock tool server.
///
/// Health probes pop scripted results first, then fall back to the default
/// (healthy unless changed). `Err` results surface as
/// `RegistryError::ToolServer`.
#[derive(Debug, Clone, Default)]
pub struct MockToolServerClient {
    state: Arc<Mutex<MockToolState>>,
    /// Track calls for verification
    pub call_log: Arc<Mutex<Vec<ToolCall>>>,
}

impl MockToolServerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one health result to be returned before the default.
    pub fn push_health(&self, result: Result<HealthReport, &str>) {
        self.state
            .lock()
            .unwrap()
            .scripted_health
            .push_back(result.map_err(str::to_string));
    }

    /// Health result returned once the script is exhausted.
    pub fn set_default_health(&self, result: Result<HealthReport, &str>) {
        self.state.lock().unwrap().default_health = result.map_err(str::to_string);
    }

    /// Response returned by every `forward`.
    pub fn set_response(&self, result: Result<serde_json::Value, &str>) {
        self.state.lock().unwrap().response = result.map_err(str::to_string);
    }

    /// Get a copy of the call log for assertions
    pub fn get_calls(&self) -> Vec<ToolCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn health_calls(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| matches!(c, ToolCall::Health { .. }))
            .count()
    }

    pub fn forward_calls(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| matches!(c, ToolCall::Forward { .. }))
            .count()
    }
}

#[async_trait]
impl ToolServerClient for MockToolServerClient {
    async fn health(&self, connection: &ContainerConnection) -> Result<HealthReport, RegistryError> {
        self.call_log.lock().unwrap().push(ToolCall::Health {
            session_id: connection.session_id.clone(),
        });

        let mut state = self.state.lock().unwrap();
        let result = match state.scripted_health.pop_front() {
            Some(result) => result,
            None => state.default_health.clone(),
        };
        result.map_err(RegistryError::tool_server)
    }

    async fn forward(
        &self,
        connection: &ContainerConnection,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, RegistryError> {
        self.call_log.lock().unwrap().push(ToolCall::Forward {
            session_id: connection.session_id.clone(),
            request,
        });

        self.state
            .lock()
            .unwrap()
            .response
            .clone()
            .map_err(RegistryError::tool_server)
    }
}
