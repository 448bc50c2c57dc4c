//! Health supervisor
//!
//! Periodically probes every running connection's tool server, backs off
//! after failures, and evicts connections whose session has ended or whose
//! container the runtime no longer reports as running.
//!
//! Connections are supervised one at a time within a tick. Cancellation is
//! observed between connections, never in the middle of one.

mod backoff;
mod decision;
mod lease;

pub use backoff::BackoffPolicy;
pub use decision::{
    DeferralView, EvictReason, Observation, ProbeView, RuntimeView, SessionView, Verdict, decide,
};
pub use lease::SupervisorLease;

use crate::registry::{ContainerRegistry, FailureState};
use crate::runtime::SharedContainerRuntime;
use chrono::{DateTime, Utc};
use sandbox_registry_core::config::SupervisorConfig;
use sandbox_registry_core::{ContainerConnection, HealthStatus, SessionStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one supervisor tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    /// Connections looked at
    pub examined: usize,
    /// Skipped because the connection is not `running`
    pub not_running: usize,
    /// Skipped inside a backoff window
    pub deferred: usize,
    /// Left alone because the session store or failure state was unreadable
    pub held: usize,
    /// Successful probes
    pub healthy: usize,
    /// Failed probes
    pub failed: usize,
    /// Past the failure threshold but still running per the runtime
    pub retained: usize,
    pub evicted: usize,
    /// Another process holds the supervisor lease
    pub lease_skipped: bool,
    /// Cancellation arrived before every connection was examined
    pub interrupted: bool,
    /// Listing connections failed; nothing was examined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            examined: 0,
            not_running: 0,
            deferred: 0,
            held: 0,
            healthy: 0,
            failed: 0,
            retained: 0,
            evicted: 0,
            lease_skipped: false,
            interrupted: false,
            load_error: None,
        }
    }
}

/// Periodic health supervisor over a [`ContainerRegistry`].
pub struct HealthSupervisor {
    registry: ContainerRegistry,
    runtime: SharedContainerRuntime,
    policy: BackoffPolicy,
    interval: Duration,
    lease: Option<SupervisorLease>,
}

impl HealthSupervisor {
    pub fn new(
        registry: ContainerRegistry,
        runtime: SharedContainerRuntime,
        config: &SupervisorConfig,
    ) -> Self {
        let lease = config
            .lease
            .enabled
            .then(|| SupervisorLease::for_this_process(&config.lease));
        Self {
            registry,
            runtime,
            policy: BackoffPolicy::from_config(config),
            interval: config.interval(),
            lease,
        }
    }

    /// Replace the lease (or disable it with `None`).
    pub fn with_lease(mut self, lease: Option<SupervisorLease>) -> Self {
        self.lease = lease;
        self
    }

    pub fn lease_holder(&self) -> Option<&str> {
        self.lease.as_ref().map(SupervisorLease::holder)
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one supervision pass over every connection.
    pub async fn tick(&self) -> TickReport {
        self.tick_until(&CancellationToken::new()).await
    }

    async fn tick_until(&self, cancel: &CancellationToken) -> TickReport {
        let clock = self.registry.clock();
        let mut report = TickReport::new(clock.now());

        if let Some(lease) = &self.lease {
            if !lease
                .try_acquire(self.registry.store(), clock.now_millis())
                .await
            {
                report.lease_skipped = true;
                return report;
            }
        }

        let connections = match self.registry.get_all_containers().await {
            Ok(connections) => connections,
            Err(e) => {
                warn!("Health check skipped: failed to list connections: {}", e);
                report.load_error = Some(e.to_string());
                return report;
            }
        };

        for connection in &connections {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            report.examined += 1;
            self.supervise(connection, &mut report).await;
        }

        if report.evicted > 0 || report.failed > 0 {
            info!(
                "Health check: {} examined, {} healthy, {} failed, {} evicted",
                report.examined, report.healthy, report.failed, report.evicted
            );
        } else {
            debug!(
                "Health check: {} examined, {} healthy, {} deferred",
                report.examined, report.healthy, report.deferred
            );
        }
        report
    }

    async fn supervise(&self, connection: &ContainerConnection, report: &mut TickReport) {
        let session_id = connection.session_id.as_str();
        let mut obs = Observation::new(connection.is_running());
        let mut failures = FailureState::default();

        loop {
            match decide(&obs) {
                Verdict::SkipNotRunning => {
                    report.not_running += 1;
                    return;
                }
                Verdict::LoadSession => {
                    obs.session = Some(self.session_view(session_id).await);
                }
                Verdict::CheckDeferral => {
                    let now_ms = self.registry.clock().now_millis();
                    obs.deferral = Some(match self.registry.failure_state(session_id).await {
                        Ok(state) => {
                            failures = state;
                            if state.is_deferred(now_ms) {
                                DeferralView::Deferred
                            } else {
                                DeferralView::Due
                            }
                        }
                        Err(e) => {
                            warn!("Failed to read failure state for {}: {}", session_id, e);
                            DeferralView::Unavailable
                        }
                    });
                }
                Verdict::Defer => {
                    debug!("Session {session_id} in backoff, skipping probe");
                    report.deferred += 1;
                    return;
                }
                Verdict::Hold => {
                    report.held += 1;
                    return;
                }
                Verdict::Probe => {
                    let probe = self.probe(connection, failures).await;
                    if matches!(probe, ProbeView::Failed { .. }) {
                        report.failed += 1;
                    }
                    obs.probe = Some(probe);
                }
                Verdict::MarkHealthy(health) => {
                    self.mark_healthy(session_id, health).await;
                    report.healthy += 1;
                    return;
                }
                Verdict::AwaitRetry => return,
                Verdict::ConsultRuntime => {
                    obs.runtime = Some(self.runtime_view(connection).await);
                }
                Verdict::Retain => {
                    warn!(
                        "Session {} keeps failing health checks but container {} is still running; leaving it registered",
                        session_id, connection.container_id
                    );
                    report.retained += 1;
                    return;
                }
                Verdict::Evict {
                    mark_session_stopped,
                    reason,
                } => {
                    self.evict(connection, mark_session_stopped, reason).await;
                    report.evicted += 1;
                    return;
                }
            }
        }
    }

    async fn session_view(&self, session_id: &str) -> SessionView {
        match self.registry.sessions().find_by_id(session_id).await {
            Ok(Some(record)) if record.status.is_terminal() => SessionView::Terminal(record.status),
            Ok(Some(_)) => SessionView::Active,
            Ok(None) => SessionView::Missing,
            Err(e) => {
                warn!("Failed to read session {}: {}", session_id, e);
                SessionView::Unavailable
            }
        }
    }

    /// Probe the tool server; on failure, bump the count and set the backoff.
    async fn probe(&self, connection: &ContainerConnection, failures: FailureState) -> ProbeView {
        let session_id = connection.session_id.as_str();
        let reason = match self.registry.tools().health(connection).await {
            Ok(report) if report.success => {
                let health = match (report.health_status(), report.status.as_deref()) {
                    (Some(health), _) => health,
                    (None, Some(raw)) => {
                        warn!(
                            "Session {} reported unrecognised health '{}', storing healthy",
                            session_id, raw
                        );
                        HealthStatus::Healthy
                    }
                    (None, None) => HealthStatus::Healthy,
                };
                return ProbeView::Healthy(health);
            }
            Ok(report) => report
                .message
                .unwrap_or_else(|| "tool server reported failure".to_string()),
            Err(e) => e.to_string(),
        };

        let count = failures.failure_count.saturating_add(1);
        let next_check_after = self
            .policy
            .next_check_after(count, self.registry.clock().now_millis());
        if let Err(e) = self
            .registry
            .record_failure(session_id, count, next_check_after)
            .await
        {
            warn!("Failed to record health failure for {}: {}", session_id, e);
        }

        warn!(
            "Health check failed for session {} ({}/{}): {}",
            session_id, count, self.policy.threshold, reason
        );
        ProbeView::Failed {
            threshold_reached: self.policy.threshold_reached(count),
        }
    }

    async fn mark_healthy(&self, session_id: &str, health: HealthStatus) {
        let now = self.registry.clock().now();
        if let Err(e) = self.registry.record_health(session_id, health, now).await {
            warn!("Failed to record health for {}: {}", session_id, e);
        }
        if let Err(e) = self.registry.clear_failures(session_id).await {
            warn!("Failed to clear failure state for {}: {}", session_id, e);
        }
    }

    async fn runtime_view(&self, connection: &ContainerConnection) -> RuntimeView {
        match self.runtime.inspect(&connection.container_id).await {
            Ok(state) if state.is_running() => RuntimeView::Running,
            Ok(state) => {
                debug!(
                    "Container {} is {:?} per {}",
                    connection.container_id,
                    state,
                    self.runtime.runtime_name()
                );
                RuntimeView::Gone
            }
            Err(e) => {
                warn!("{}", e);
                RuntimeView::QueryFailed
            }
        }
    }

    async fn evict(
        &self,
        connection: &ContainerConnection,
        mark_session_stopped: bool,
        reason: EvictReason,
    ) {
        let session_id = connection.session_id.as_str();
        info!(
            "Evicting container {} for session {}: {}",
            connection.container_id, session_id, reason
        );

        if mark_session_stopped {
            if let Err(e) = self
                .registry
                .sessions()
                .update_status(session_id, SessionStatus::Stopped)
                .await
            {
                warn!("Failed to mark session {} stopped: {}", session_id, e);
            }
        }
        self.registry.unregister_container(session_id).await;
    }

    /// Tick every interval until `cancel` fires, publishing each report.
    ///
    /// The first tick runs one interval after the call. A slow tick delays
    /// the next one instead of bursting.
    pub async fn run(&self, cancel: CancellationToken, reports: watch::Sender<Option<TickReport>>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Health supervisor started (interval {:?}, threshold {}{})",
            self.interval,
            self.policy.threshold,
            if self.lease.is_some() { ", lease enabled" } else { "" }
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health supervisor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick_until(&cancel).await;
                    reports.send_replace(Some(report));
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn start(self: Arc<Self>) -> SupervisorHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(task_cancel, tx).await });
        SupervisorHandle {
            cancel,
            task,
            reports: rx,
        }
    }
}

/// Handle to a running supervisor task.
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    reports: watch::Receiver<Option<TickReport>>,
}

impl SupervisorHandle {
    /// Receiver for the latest tick report.
    pub fn reports(&self) -> watch::Receiver<Option<TickReport>> {
        self.reports.clone()
    }

    /// Stop the supervisor, waiting up to `timeout` for the current tick to
    /// finish. Returns `false` if the task had to be aborted.
    pub async fn stop(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Health supervisor task failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Health supervisor did not stop within {:?}; aborting", timeout);
                self.task.abort();
                false
            }
        }
    }
}
