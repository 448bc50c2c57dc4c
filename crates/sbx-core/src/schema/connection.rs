//! Container connection record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a registered container.
///
/// Transitions are directional in intent (`starting → running → stopping →
/// stopped`, anything → `error`) but not enforced: callers may set any value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ContainerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ContainerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Last health value reported by the in-container tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
    /// No health information. The tool server's `stopped` maps here.
    None,
}

impl HealthStatus {
    /// Map the tool server's reported status string to a stored value.
    ///
    /// `stopped` is folded into [`HealthStatus::None`]; unrecognised values
    /// yield `None` (the `Option`), leaving the stored health untouched.
    pub fn from_reported(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            "stopped" | "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::None => "none",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding of one logical session to one running container.
///
/// Persisted under `containers:session:{session_id}`; see [`crate::codec`] for
/// the stored representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConnection {
    pub session_id: String,
    pub user_id: String,
    pub container_id: String,
    pub container_name: String,
    pub host: String,
    pub tool_server_port: u16,
    pub dev_server_port: u16,
    pub status: ContainerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_status: Option<HealthStatus>,
}

impl ContainerConnection {
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    /// Base URL of the tool server inside the container.
    pub fn tool_server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.tool_server_port)
    }

    /// Base URL of the proxied dev server inside the container.
    pub fn dev_server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.dev_server_port)
    }
}
