//! Shared-store key layout.

/// Prefix of forward records: `containers:session:{sessionId}`.
pub const SESSION_KEY_PREFIX: &str = "containers:session:";

/// Glob pattern matching every forward record.
pub const SESSION_KEY_PATTERN: &str = "containers:session:*";

/// Hash `containerId → sessionId`.
pub const CONTAINER_INDEX: &str = "containers:index:containerToSession";

/// Hash `sessionId → consecutive probe failures`.
pub const FAILURE_COUNTS: &str = "containers:meta:failureCounts";

/// Hash `sessionId → epoch-millis before which no probe runs`.
pub const NEXT_CHECK_AFTER: &str = "containers:meta:nextCheckAfter";

/// String key holding the current supervisor lease holder.
pub const SUPERVISOR_LEASE: &str = "containers:meta:supervisorLease";

pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

/// Inverse of [`session_key`].
pub fn session_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(SESSION_KEY_PREFIX).filter(|id| !id.is_empty())
}
