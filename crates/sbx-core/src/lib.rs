//! Core types for the sandbox container registry.
//!
//! This crate holds everything the registry and its supervisor share but that
//! does not talk to the outside world:
//! - the [`ContainerConnection`] record and status enums
//! - the versioned codec used to persist connections in the shared store
//! - the shared-store key layout
//! - the closed error taxonomy ([`RegistryError`])
//! - an injectable [`Clock`]
//! - configuration resolution and logging initialization

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod schema;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{CodecError, RegistryError};
pub use schema::{
    ContainerConnection, ContainerStatus, HealthStatus, SessionRecord, SessionStatus,
};
