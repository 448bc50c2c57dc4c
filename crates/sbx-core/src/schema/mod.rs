//! Records shared between the registry, the supervisor, and the session store.

mod connection;
mod session;

pub use connection::{ContainerConnection, ContainerStatus, HealthStatus, UnknownStatus};
pub use session::{SessionRecord, SessionStatus};
