//! Sandbox container registry and health supervisor
//!
//! Tracks which container serves which sandbox session in a shared store,
//! routes tool-server operations to the right container, and runs a
//! periodic supervisor that probes tool servers and evicts dead entries.
//!
//! Collaborators sit behind traits so tests can swap them:
//! - [`store::StateStore`] (Redis, in-memory)
//! - [`session_store::SessionStore`] (Postgres, in-memory)
//! - [`runtime::ContainerRuntime`] (Docker, mock)
//! - [`tool_client::ToolServerClient`] (HTTP, mock)

pub mod daemon;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod session_store;
pub mod store;
pub mod supervisor;
pub mod tool_client;

pub use reconciler::{ReconcileReport, StartupReconciler};
pub use registry::{ContainerRegistry, FailureState};
pub use supervisor::{HealthSupervisor, SupervisorHandle, TickReport};
