//! Docker Engine runtime backend.

use super::{ContainerRuntime, ContainerState};
use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::InspectContainerOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use sandbox_registry_core::RegistryError;
use sandbox_registry_core::config::DockerConfig;
use tracing::debug;

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the socket in `config`, or local defaults when unset.
    ///
    /// Connecting does not contact the daemon; the first `inspect` does.
    pub fn connect(config: &DockerConfig) -> Result<Self, RegistryError> {
        let docker = match &config.socket {
            Some(path) => Docker::connect_with_socket(path, config.timeout_secs, API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RegistryError::runtime_query("-", format!("docker connect failed: {e}")))?;

        Ok(Self { docker })
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => *status_code == 404,
        _ => false,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RegistryError> {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => {
                let state = response.state;
                let running = state.as_ref().and_then(|s| s.running).unwrap_or(false);
                if running {
                    return Ok(ContainerState::Running);
                }
                let status = state.and_then(|s| s.status).map(|s| s.to_string());
                debug!("Container {container_id} not running (status: {status:?})");
                Ok(ContainerState::NotRunning { status })
            }
            Err(e) if is_not_found_error(&e) => Ok(ContainerState::NotFound),
            Err(e) => Err(RegistryError::runtime_query(container_id, e.to_string())),
        }
    }

    fn runtime_name(&self) -> &str {
        "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: c1".to_string(),
        };
        assert!(is_not_found_error(&err));

        let err = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(!is_not_found_error(&err));
    }
}
