//! Container runtime query interface
//!
//! The runtime is the ground truth for "does this container still exist".
//! The registry never starts or stops containers; it only asks.

use async_trait::async_trait;
use sandbox_registry_core::RegistryError;
use std::sync::Arc;

mod docker;
mod mock;

pub use docker::DockerRuntime;
pub use mock::{MockContainerRuntime, RuntimeCall};

/// What the runtime reports for a container id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Container exists and is running.
    Running,
    /// Container exists but is not running (exited, paused, created, ...).
    NotRunning { status: Option<String> },
    /// No container with this id.
    NotFound,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Read-only access to the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by id or name.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RuntimeQuery` when the runtime cannot answer.
    /// A missing container is `Ok(ContainerState::NotFound)`, not an error.
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RegistryError>;

    /// Runtime name for logging
    fn runtime_name(&self) -> &str;
}

/// Shared runtime handle.
pub type SharedContainerRuntime = Arc<dyn ContainerRuntime>;
