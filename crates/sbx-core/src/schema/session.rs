//! Durable session record, as read from the session store.

use super::connection::UnknownStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User-visible lifecycle status of a logical sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Creating,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl SessionStatus {
    /// `stopped` and `error` end supervision.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creating" => Ok(Self::Creating),
            "initializing" => Ok(Self::Initializing),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// The fields of a session that the registry reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub status: SessionStatus,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, status: SessionStatus) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            status,
        }
    }
}
