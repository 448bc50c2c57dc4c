//! Daemon status file writer
//!
//! Writes `status.json` into the configured status directory so operators
//! (and `sbx-daemon` subcommands) can see what the supervisor last did.

use crate::reconciler::ReconcileReport;
use crate::supervisor::TickReport;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File name inside the status directory
pub const STATUS_FILE: &str = "status.json";

/// Supervision results carried into every status write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionState {
    /// Startup reconciliation, if it ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    /// Most recent supervisor tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<TickReport>,
    /// Lease holder id when the supervisor lease is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_holder: Option<String>,
}

/// Daemon status snapshot written to status.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// ISO 8601 timestamp when status was last written
    pub timestamp: String,
    /// Process ID of the daemon
    pub pid: u32,
    /// Daemon version (crate version)
    pub version: String,
    /// Uptime in seconds since daemon start
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub supervision: SupervisionState,
}

/// Status file writer that tracks daemon state
pub struct StatusWriter {
    status_path: PathBuf,
    start_time: SystemTime,
    version: String,
}

impl StatusWriter {
    /// Writer for `{status_dir}/status.json`.
    pub fn new(status_dir: PathBuf, version: String) -> Self {
        Self {
            status_path: status_dir.join(STATUS_FILE),
            start_time: SystemTime::now(),
            version,
        }
    }

    /// Write daemon status atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or the file cannot be
    /// written or renamed.
    pub fn write_status(&self, supervision: &SupervisionState) -> Result<()> {
        if let Some(parent) = self.status_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create daemon status directory")?;
        }

        let uptime_secs = self
            .start_time
            .elapsed()
            .unwrap_or(Duration::ZERO)
            .as_secs();

        let status = DaemonStatus {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            pid: std::process::id(),
            version: self.version.clone(),
            uptime_secs,
            supervision: supervision.clone(),
        };

        let json = serde_json::to_string_pretty(&status)
            .context("Failed to serialize daemon status")?;

        // On Windows, rename doesn't replace existing files
        let temp_path = self.status_path.with_extension("json.tmp");
        std::fs::write(&temp_path, json.as_bytes())
            .context("Failed to write status temp file")?;
        if cfg!(windows) && self.status_path.exists() {
            std::fs::remove_file(&self.status_path)
                .context("Failed to remove existing status file")?;
        }
        std::fs::rename(&temp_path, &self.status_path)
            .context("Failed to rename status temp file to final path")?;

        Ok(())
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }
}

/// Read a status file written by [`StatusWriter`].
pub fn read_status(status_dir: &Path) -> Result<DaemonStatus> {
    let path = status_dir.join(STATUS_FILE);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_writer_creates_nested_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("sbx/daemon");
        let writer = StatusWriter::new(dir.clone(), "0.9.2".to_string());

        writer.write_status(&SupervisionState::default()).unwrap();

        assert!(writer.status_path().exists());
        assert!(!dir.join("status.json.tmp").exists());
    }

    #[test]
    fn test_status_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let writer = StatusWriter::new(temp_dir.path().to_path_buf(), "0.9.2".to_string());
        let supervision = SupervisionState {
            reconcile: Some(ReconcileReport {
                checked: 3,
                evicted: vec!["s2".to_string()],
                errors: 1,
            }),
            last_tick: None,
            lease_holder: Some("host-1234".to_string()),
        };

        writer.write_status(&supervision).unwrap();
        let status = read_status(temp_dir.path()).unwrap();

        assert_eq!(status.version, "0.9.2");
        assert_eq!(status.pid, std::process::id());
        assert_eq!(status.supervision, supervision);
        assert!(status.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let temp_dir = TempDir::new().unwrap();
        let writer = StatusWriter::new(temp_dir.path().to_path_buf(), "0.9.2".to_string());

        writer.write_status(&SupervisionState::default()).unwrap();
        let supervision = SupervisionState {
            lease_holder: Some("me".to_string()),
            ..Default::default()
        };
        writer.write_status(&supervision).unwrap();

        let status = read_status(temp_dir.path()).unwrap();
        assert_eq!(status.supervision.lease_holder.as_deref(), Some("me"));
    }

    #[test]
    fn test_read_missing_status_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_status(temp_dir.path()).is_err());
    }
}
