//! Main daemon event loop

use crate::daemon::{DaemonContext, StatusWriter, SupervisionState};
use crate::reconciler::StartupReconciler;
use crate::supervisor::HealthSupervisor;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the daemon until `cancel` fires.
///
/// 1. Reconcile persisted connections against the runtime (if enabled)
/// 2. Start the health supervisor
/// 3. Rewrite the status file after every tick
/// 4. On cancellation, stop the supervisor within the shutdown timeout
pub async fn run(ctx: &DaemonContext, status: &StatusWriter, cancel: CancellationToken) -> Result<()> {
    info!("Initializing daemon event loop");

    let supervisor = HealthSupervisor::new(
        ctx.registry.clone(),
        ctx.runtime.clone(),
        &ctx.config.supervisor,
    );
    let mut state = SupervisionState {
        lease_holder: supervisor.lease_holder().map(str::to_string),
        ..Default::default()
    };

    if ctx.config.supervisor.startup_reconcile {
        let reconciler = StartupReconciler::new(ctx.registry.clone(), ctx.runtime.clone());
        match reconciler.reconcile().await {
            Ok(report) => state.reconcile = Some(report),
            // Supervision still runs; the first tick re-lists everything
            Err(e) => error!("Startup reconciliation failed: {}", e),
        }
    }
    write_status(status, &state);

    if cancel.is_cancelled() {
        return Ok(());
    }

    let handle = Arc::new(supervisor).start();
    let mut reports = handle.reports();

    info!("Daemon event loop running. Waiting for cancellation signal...");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = reports.changed() => {
                if changed.is_err() {
                    warn!("Health supervisor exited unexpectedly");
                    break;
                }
                state.last_tick = reports.borrow_and_update().clone();
                write_status(status, &state);
            }
        }
    }

    info!("Cancellation signal received. Beginning shutdown...");
    let timeout = Duration::from_secs(ctx.config.daemon.shutdown_timeout_secs);
    if !handle.stop(timeout).await {
        warn!("Health supervisor did not shut down cleanly");
    }

    info!("Daemon event loop shutdown complete");
    Ok(())
}

fn write_status(status: &StatusWriter, state: &SupervisionState) {
    if let Err(e) = status.write_status(state) {
        warn!("Failed to write daemon status: {:#}", e);
    }
}
