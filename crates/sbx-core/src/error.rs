//! Error taxonomy for registry, supervisor, and collaborator operations.
//!
//! Every fallible registry path returns one of these variants so callers can
//! dispatch on the kind instead of matching message text.

use crate::schema::ContainerStatus;
use thiserror::Error;

/// Errors surfaced by the container registry and its collaborators.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The session is unknown to the session store, or has no connection.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The connection exists but is not routable.
    #[error("container for session {session_id} is not running (status: {status})")]
    NotRunning {
        session_id: String,
        status: ContainerStatus,
    },

    /// The container runtime could not answer.
    #[error("container runtime query failed for {container_id}: {message}")]
    RuntimeQuery {
        container_id: String,
        message: String,
    },

    /// Transport or HTTP failure talking to a tool server.
    #[error("tool server error: {message}")]
    ToolServer { message: String },

    /// Failure reading or writing the durable session store.
    #[error("session store error: {message}")]
    SessionStore { message: String },

    /// Failure talking to the shared state store.
    #[error("state store error: {message}")]
    Store { message: String },

    /// A stored connection could not be encoded or decoded.
    #[error("connection codec error: {0}")]
    Codec(#[from] CodecError),
}

impl RegistryError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn session_store(message: impl Into<String>) -> Self {
        Self::SessionStore {
            message: message.into(),
        }
    }

    pub fn tool_server(message: impl Into<String>) -> Self {
        Self::ToolServer {
            message: message.into(),
        }
    }

    pub fn runtime_query(container_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeQuery {
            container_id: container_id.into(),
            message: message.into(),
        }
    }
}

/// Errors from the stored-connection codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not valid JSON or a field has the wrong type.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Written by a newer schema than this build understands.
    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A timestamp field is not ISO-8601.
    #[error("invalid timestamp in '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_running_message_includes_status() {
        let err = RegistryError::NotRunning {
            session_id: "s1".to_string(),
            status: ContainerStatus::Starting,
        };
        assert_eq!(
            err.to_string(),
            "container for session s1 is not running (status: starting)"
        );
    }

    #[test]
    fn test_codec_error_converts() {
        let err: RegistryError = CodecError::MissingField("host").into();
        assert!(matches!(err, RegistryError::Codec(CodecError::MissingField("host"))));
    }
}
