//! Startup reconciliation
//!
//! Registry entries outlive the processes that wrote them. Before the first
//! supervisor tick, every persisted connection is checked against the
//! container runtime and entries for missing or stopped containers are
//! removed.

use crate::registry::ContainerRegistry;
use crate::runtime::SharedContainerRuntime;
use sandbox_registry_core::RegistryError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Connections checked against the runtime
    pub checked: usize,
    /// Session ids whose connection was removed
    pub evicted: Vec<String>,
    /// Connections left in place because the runtime could not answer
    pub errors: usize,
}

pub struct StartupReconciler {
    registry: ContainerRegistry,
    runtime: SharedContainerRuntime,
}

impl StartupReconciler {
    pub fn new(registry: ContainerRegistry, runtime: SharedContainerRuntime) -> Self {
        Self { registry, runtime }
    }

    /// Remove connections whose container is gone or not running.
    ///
    /// A runtime error for one connection is logged and that connection is
    /// kept; the pass continues.
    ///
    /// # Errors
    ///
    /// Fails only if the connection list cannot be loaded.
    pub async fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        let connections = self.registry.get_all_containers().await?;
        let mut report = ReconcileReport::default();

        for connection in connections {
            report.checked += 1;
            match self.runtime.inspect(&connection.container_id).await {
                Ok(state) if state.is_running() => {}
                Ok(state) => {
                    info!(
                        "Reconcile: container {} for session {} is {:?}, removing",
                        connection.container_id, connection.session_id, state
                    );
                    self.registry
                        .unregister_container(&connection.session_id)
                        .await;
                    report.evicted.push(connection.session_id);
                }
                Err(e) => {
                    warn!(
                        "Reconcile: keeping session {} ({})",
                        connection.session_id, e
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            "Reconcile complete: {} checked, {} removed, {} errors",
            report.checked,
            report.evicted.len(),
            report.errors
        );
        Ok(report)
    }
}
