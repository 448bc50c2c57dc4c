//! Client for the tool server running inside each sandbox container.
//!
//! Two calls are consumed: a health probe and a generic operation endpoint
//! whose JSON bodies are forwarded verbatim in both directions.

use async_trait::async_trait;
use sandbox_registry_core::{ContainerConnection, HealthStatus, RegistryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod http;
mod mock;

pub use http::HttpToolServerClient;
pub use mock::{MockToolServerClient, ToolCall};

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Tool server's own verdict
    pub success: bool,
    /// Container health as the tool server sees it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-form detail, logged on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            success: true,
            status: Some("healthy".to_string()),
            message: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some("unhealthy".to_string()),
            message: Some(message.into()),
        }
    }

    /// Health value to store on the connection (`stopped` → `none`).
    pub fn health_status(&self) -> Option<HealthStatus> {
        self.status.as_deref().and_then(HealthStatus::from_reported)
    }
}

/// Transport to a container's tool server.
#[async_trait]
pub trait ToolServerClient: Send + Sync {
    /// Probe `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ToolServer` on transport failure, timeout, or
    /// a non-2xx response.
    async fn health(&self, connection: &ContainerConnection) -> Result<HealthReport, RegistryError>;

    /// Forward an opaque operation request and return the opaque response.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ToolServer` on transport failure, timeout, or
    /// a non-2xx response.
    async fn forward(
        &self,
        connection: &ContainerConnection,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, RegistryError>;
}

/// Shared client handle.
pub type SharedToolServerClient = Arc<dyn ToolServerClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_report_parses_minimal_body() {
        let report: HealthReport = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(report.success);
        assert_eq!(report.health_status(), None);
    }

    #[test]
    fn test_health_report_maps_stopped_to_none() {
        let report: HealthReport =
            serde_json::from_str(r#"{"success": true, "status": "stopped", "uptime": 12}"#)
                .unwrap();
        assert_eq!(report.health_status(), Some(HealthStatus::None));
    }

    #[test]
    fn test_constructors() {
        assert_eq!(HealthReport::healthy().health_status(), Some(HealthStatus::Healthy));
        let failing = HealthReport::failing("disk full");
        assert!(!failing.success);
        assert_eq!(failing.message.as_deref(), Some("disk full"));
    }
}
