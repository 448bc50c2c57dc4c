//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared state store
    #[serde(default)]
    pub redis: RedisConfig,
    /// Container runtime
    #[serde(default)]
    pub docker: DockerConfig,
    /// In-container tool server client
    #[serde(default)]
    pub tool_server: ToolServerConfig,
    /// Durable session record store
    #[serde(default)]
    pub session_store: SessionStoreConfig,
    /// Health supervisor
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Daemon process settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Shared state store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Unix socket path. `None` uses the local defaults (`DOCKER_HOST` or the
    /// platform socket).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    /// Engine API request timeout in seconds
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

fn default_docker_timeout_secs() -> u64 {
    10
}

/// Tool-server client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Timeout for `GET /health`, in milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// Timeout for forwarded operations, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Path of the generic operation endpoint
    #[serde(default = "default_operation_path")]
    pub operation_path: String,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            health_timeout_ms: default_health_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            operation_path: default_operation_path(),
        }
    }
}

impl ToolServerConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_health_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_operation_path() -> String {
    "/api/operation".to_string()
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStoreConfig {
    /// Postgres connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Table holding session records
    #[serde(default = "default_session_table")]
    pub table: String,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            table: default_session_table(),
        }
    }
}

fn default_session_table() -> String {
    "sandbox_sessions".to_string()
}

/// Health supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive probe failures before the runtime is consulted
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Deferral after the first failure, in milliseconds
    #[serde(default = "default_first_backoff_ms")]
    pub first_backoff_ms: u64,
    /// Deferral after every later failure, in milliseconds
    #[serde(default = "default_repeat_backoff_ms")]
    pub repeat_backoff_ms: u64,
    /// Run the startup reconciler before the first tick
    #[serde(default = "default_true")]
    pub startup_reconcile: bool,
    /// Optional single-supervisor lease
    #[serde(default)]
    pub lease: LeaseConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            failure_threshold: default_failure_threshold(),
            first_backoff_ms: default_first_backoff_ms(),
            repeat_backoff_ms: default_repeat_backoff_ms(),
            startup_reconcile: true,
            lease: LeaseConfig::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_first_backoff_ms() -> u64 {
    5_000
}

fn default_repeat_backoff_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

/// Supervisor lease configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// When false every process supervises every connection
    #[serde(default)]
    pub enabled: bool,
    /// Lease lifetime in milliseconds; renewed every tick by the holder
    #[serde(default = "default_lease_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: default_lease_ttl_ms(),
        }
    }
}

fn default_lease_ttl_ms() -> u64 {
    90_000
}

/// Daemon process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory for `status.json` (default: `~/.config/sbx/daemon`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_dir: Option<PathBuf>,
    /// Seconds to wait for the supervisor to stop on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            status_dir: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}
