//! HTTP tool-server client

use super::{HealthReport, ToolServerClient};
use async_trait::async_trait;
use sandbox_registry_core::config::ToolServerConfig;
use sandbox_registry_core::{ContainerConnection, RegistryError};
use std::time::Duration;

/// [`ToolServerClient`] over plain HTTP to `http://{host}:{toolServerPort}`.
///
/// Timeouts are the only bound on a probe; the supervisor sets none of its
/// own.
#[derive(Debug, Clone)]
pub struct HttpToolServerClient {
    client: reqwest::Client,
    health_timeout: Duration,
    request_timeout: Duration,
    operation_path: String,
}

impl HttpToolServerClient {
    pub fn new(config: &ToolServerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_timeout: config.health_timeout(),
            request_timeout: config.request_timeout(),
            operation_path: normalize_path(&config.operation_path),
        }
    }

    fn health_url(connection: &ContainerConnection) -> String {
        format!("{}/health", connection.tool_server_url())
    }

    fn operation_url(&self, connection: &ContainerConnection) -> String {
        format!("{}{}", connection.tool_server_url(), self.operation_path)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[async_trait]
impl ToolServerClient for HttpToolServerClient {
    async fn health(&self, connection: &ContainerConnection) -> Result<HealthReport, RegistryError> {
        let url = Self::health_url(connection);
        let resp = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| RegistryError::tool_server(format!("GET {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::tool_server(format!(
                "GET {url} returned {status}"
            )));
        }

        resp.json::<HealthReport>()
            .await
            .map_err(|e| RegistryError::tool_server(format!("GET {url}: invalid body: {e}")))
    }

    async fn forward(
        &self,
        connection: &ContainerConnection,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, RegistryError> {
        let url = self.operation_url(connection);
        let resp = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| RegistryError::tool_server(format!("POST {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::tool_server(format!(
                "POST {url} returned {status}: {body}"
            )));
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| RegistryError::tool_server(format!("POST {url}: invalid body: {e}")))
    }
}
