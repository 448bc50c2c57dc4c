//! Per-connection supervision decisions
//!
//! [`decide`] is the single place that orders the evidence the supervisor
//! gathers about a connection. It is called repeatedly as evidence arrives;
//! each call either asks for the next piece or settles the connection for
//! this tick.
//!
//! Precedence, highest first:
//!
//! 1. a connection that is not `running` is not supervised
//! 2. a terminal or missing session record evicts
//! 3. an unreadable session record or failure state leaves the connection
//!    alone this tick
//! 4. a deferral window skips the probe
//! 5. probe result
//! 6. past the failure threshold, the runtime overrides the probe

use sandbox_registry_core::{HealthStatus, SessionStatus};
use std::fmt;

/// What the session store says about the connection's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionView {
    Active,
    Terminal(SessionStatus),
    Missing,
    Unavailable,
}

/// Failure-tracking state relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferralView {
    Due,
    Deferred,
    Unavailable,
}

/// Outcome of a health probe, after the failure count was updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeView {
    Healthy(HealthStatus),
    Failed { threshold_reached: bool },
}

/// What the container runtime says about the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeView {
    Running,
    Gone,
    QueryFailed,
}

/// Evidence gathered so far for one connection in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub connection_running: bool,
    pub session: Option<SessionView>,
    pub deferral: Option<DeferralView>,
    pub probe: Option<ProbeView>,
    pub runtime: Option<RuntimeView>,
}

impl Observation {
    pub fn new(connection_running: bool) -> Self {
        Self {
            connection_running,
            session: None,
            deferral: None,
            probe: None,
            runtime: None,
        }
    }
}

/// Why a connection is being evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    SessionTerminal(SessionStatus),
    SessionMissing,
    ContainerGone,
    RuntimeQueryFailed,
}

impl fmt::Display for EvictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionTerminal(status) => write!(f, "session is {status}"),
            Self::SessionMissing => f.write_str("session record no longer exists"),
            Self::ContainerGone => f.write_str("container is not running"),
            Self::RuntimeQueryFailed => f.write_str("container runtime query failed"),
        }
    }
}

/// Next step for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Connection is not `running`; not supervised.
    SkipNotRunning,
    /// Read the session record.
    LoadSession,
    /// Read failure tracking and compare with now.
    CheckDeferral,
    /// Inside the backoff window.
    Defer,
    /// Evidence is unavailable; leave the connection alone this tick.
    Hold,
    /// Probe the tool server.
    Probe,
    /// Probe succeeded; persist health and clear failures.
    MarkHealthy(HealthStatus),
    /// Probe failed below the threshold; wait for the backoff.
    AwaitRetry,
    /// Threshold reached; ask the runtime.
    ConsultRuntime,
    /// Threshold reached but the container is still running.
    Retain,
    /// Remove the connection.
    Evict {
        mark_session_stopped: bool,
        reason: EvictReason,
    },
}

pub fn decide(obs: &Observation) -> Verdict {
    if !obs.connection_running {
        return Verdict::SkipNotRunning;
    }

    match obs.session {
        None => return Verdict::LoadSession,
        Some(SessionView::Terminal(status)) => {
            return Verdict::Evict {
                mark_session_stopped: false,
                reason: EvictReason::SessionTerminal(status),
            };
        }
        Some(SessionView::Missing) => {
            return Verdict::Evict {
                mark_session_stopped: false,
                reason: EvictReason::SessionMissing,
            };
        }
        Some(SessionView::Unavailable) => return Verdict::Hold,
        Some(SessionView::Active) => {}
    }

    match obs.deferral {
        None => return Verdict::CheckDeferral,
        Some(DeferralView::Deferred) => return Verdict::Defer,
        Some(DeferralView::Unavailable) => return Verdict::Hold,
        Some(DeferralView::Due) => {}
    }

    match obs.probe {
        None => Verdict::Probe,
        Some(ProbeView::Healthy(health)) => Verdict::MarkHealthy(health),
        Some(ProbeView::Failed {
            threshold_reached: false,
        }) => Verdict::AwaitRetry,
        Some(ProbeView::Failed {
            threshold_reached: true,
        }) => match obs.runtime {
            None => Verdict::ConsultRuntime,
            Some(RuntimeView::Running) => Verdict::Retain,
            Some(RuntimeView::Gone) => Verdict::Evict {
                mark_session_stopped: true,
                reason: EvictReason::ContainerGone,
            },
            Some(RuntimeView::QueryFailed) => Verdict::Evict {
                mark_session_stopped: true,
                reason: EvictReason::RuntimeQueryFailed,
            },
        },
    }
}
