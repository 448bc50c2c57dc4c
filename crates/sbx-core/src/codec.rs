//! Versioned codec for connections stored in the shared store.
//!
//! Stored form is a camelCase JSON object with ISO-8601 timestamps
//! (millisecond precision, `Z` suffix) and a `schemaVersion` field:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "sessionId": "s1",
//!   "userId": "u1",
//!   "containerId": "c1",
//!   "containerName": "sandbox-s1",
//!   "host": "sandbox-s1",
//!   "toolServerPort": 4000,
//!   "devServerPort": 3000,
//!   "status": "running",
//!   "registeredAt": "2026-03-01T12:00:00.000Z",
//!   "lastHealthCheck": null,
//!   "healthStatus": null
//! }
//! ```
//!
//! Records written before versioning carry no `schemaVersion` and decode as
//! version 1. Unknown fields are ignored.

use crate::error::CodecError;
use crate::schema::{ContainerConnection, ContainerStatus, HealthStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CONNECTION_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredConnectionRef<'a> {
    schema_version: u32,
    session_id: &'a str,
    user_id: &'a str,
    container_id: &'a str,
    container_name: &'a str,
    host: &'a str,
    tool_server_port: u16,
    dev_server_port: u16,
    status: ContainerStatus,
    registered_at: String,
    last_health_check: Option<String>,
    health_status: Option<HealthStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConnection {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    container_id: Option<String>,
    #[serde(default)]
    container_name: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    tool_server_port: Option<u16>,
    #[serde(default)]
    dev_server_port: Option<u16>,
    #[serde(default)]
    status: Option<ContainerStatus>,
    #[serde(default)]
    registered_at: Option<String>,
    #[serde(default)]
    last_health_check: Option<String>,
    #[serde(default)]
    health_status: Option<HealthStatus>,
}

/// Serialize a connection for storage.
pub fn encode_connection(connection: &ContainerConnection) -> Result<String, CodecError> {
    let stored = StoredConnectionRef {
        schema_version: CONNECTION_SCHEMA_VERSION,
        session_id: &connection.session_id,
        user_id: &connection.user_id,
        container_id: &connection.container_id,
        container_name: &connection.container_name,
        host: &connection.host,
        tool_server_port: connection.tool_server_port,
        dev_server_port: connection.dev_server_port,
        status: connection.status,
        registered_at: format_timestamp(connection.registered_at),
        last_health_check: connection.last_health_check.map(format_timestamp),
        health_status: connection.health_status,
    };
    Ok(serde_json::to_string(&stored)?)
}

/// Parse a stored connection.
///
/// Fails with [`CodecError::MissingField`] when any routing field
/// (`containerId`, `containerName`, `host`, `toolServerPort`,
/// `devServerPort`) is absent or empty; such records are unusable.
pub fn decode_connection(raw: &str) -> Result<ContainerConnection, CodecError> {
    let stored: StoredConnection = serde_json::from_str(raw)?;

    let version = stored.schema_version.unwrap_or(1);
    if version > CONNECTION_SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            supported: CONNECTION_SCHEMA_VERSION,
        });
    }

    let container_id = required_text(stored.container_id, "containerId")?;
    let container_name = required_text(stored.container_name, "containerName")?;
    let host = required_text(stored.host, "host")?;
    let tool_server_port = stored
        .tool_server_port
        .ok_or(CodecError::MissingField("toolServerPort"))?;
    let dev_server_port = stored
        .dev_server_port
        .ok_or(CodecError::MissingField("devServerPort"))?;

    let session_id = required_text(stored.session_id, "sessionId")?;
    let status = stored.status.ok_or(CodecError::MissingField("status"))?;
    let registered_at = stored
        .registered_at
        .ok_or(CodecError::MissingField("registeredAt"))
        .and_then(|raw| parse_timestamp("registeredAt", &raw))?;
    let last_health_check = stored
        .last_health_check
        .map(|raw| parse_timestamp("lastHealthCheck", &raw))
        .transpose()?;

    Ok(ContainerConnection {
        session_id,
        user_id: stored.user_id.unwrap_or_default(),
        container_id,
        container_name,
        host,
        tool_server_port,
        dev_server_port,
        status,
        registered_at,
        last_health_check,
        health_status: stored.health_status,
    })
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, CodecError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CodecError::MissingField(field)),
    }
}

/// Format a timestamp as ISO-8601 with millisecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CodecError::InvalidTimestamp {
            field,
            value: raw.to_string(),
        })
}
