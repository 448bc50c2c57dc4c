//! Integration tests for the health supervisor

mod common;

use common::{Harness, START_MILLIS};
use sandbox_registry_core::config::{LeaseConfig, SupervisorConfig};
use sandbox_registry_core::{ContainerStatus, HealthStatus, SessionRecord, SessionStatus};
use sandbox_registry_daemon::runtime::{ContainerState, RuntimeCall};
use sandbox_registry_daemon::supervisor::SupervisorLease;
use sandbox_registry_daemon::tool_client::HealthReport;
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;

#[tokio::test]
async fn test_healthy_probe_records_health_and_clears_failures() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.registry.record_failure("s1", 2, START_MILLIS - 1).await.unwrap();
    h.clock.advance(Duration::from_secs(1));

    let report = h.supervisor().tick().await;

    assert_eq!(report.examined, 1);
    assert_eq!(report.healthy, 1);
    assert_eq!(report.failed, 0);
    let conn = h.registry.get_container_connection("s1").await.unwrap().unwrap();
    assert_eq!(conn.last_health_check, Some(h.clock_now()));
    assert_eq!(conn.health_status, Some(HealthStatus::Healthy));
    assert_eq!(h.registry.failure_state("s1").await.unwrap(), Default::default());
}

#[tokio::test]
async fn test_reported_stopped_health_is_stored_as_none() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.push_health(Ok(HealthReport {
        success: true,
        status: Some("stopped".to_string()),
        message: None,
    }));

    h.supervisor().tick().await;

    let conn = h.registry.get_container_connection("s1").await.unwrap().unwrap();
    assert_eq!(conn.health_status, Some(HealthStatus::None));
}

#[tokio::test]
#[traced_test]
async fn test_unrecognised_reported_health_is_stored_as_healthy_and_logged() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.push_health(Ok(HealthReport {
        success: true,
        status: Some("degraded".to_string()),
        message: None,
    }));

    assert_eq!(h.supervisor().tick().await.healthy, 1);

    let conn = h.registry.get_container_connection("s1").await.unwrap().unwrap();
    assert_eq!(conn.health_status, Some(HealthStatus::Healthy));
    assert!(logs_contain("reported unrecognised health 'degraded'"));
}

#[tokio::test]
async fn test_not_running_connection_is_not_probed() {
    let h = Harness::new();
    h.add_session("s1", "u1");
    h.registry
        .register_container("s1", "c1", "sandbox-s1", 4000, 3000)
        .await
        .unwrap();

    let report = h.supervisor().tick().await;

    assert_eq!(report.not_running, 1);
    assert_eq!(h.tools.health_calls(), 0);
}

#[tokio::test]
async fn test_backoff_schedule_and_reset_on_success() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.set_default_health(Err("connection refused"));
    let supervisor = h.supervisor();

    // First failure: 5s backoff
    let report = supervisor.tick().await;
    assert_eq!(report.failed, 1);
    let state = h.registry.failure_state("s1").await.unwrap();
    assert_eq!(state.failure_count, 1);
    assert_eq!(state.next_check_after, Some(START_MILLIS + 5_000));

    h.clock.advance(Duration::from_millis(4_999));
    assert_eq!(supervisor.tick().await.deferred, 1);
    assert_eq!(h.tools.health_calls(), 1);

    // Second failure: 60s backoff
    h.clock.advance(Duration::from_millis(1));
    assert_eq!(supervisor.tick().await.failed, 1);
    let state = h.registry.failure_state("s1").await.unwrap();
    assert_eq!(state.failure_count, 2);
    assert_eq!(state.next_check_after, Some(START_MILLIS + 5_000 + 60_000));

    h.clock.advance(Duration::from_millis(59_999));
    assert_eq!(supervisor.tick().await.deferred, 1);
    assert_eq!(h.tools.health_calls(), 2);

    // Recovery clears count and deferral
    h.tools.set_default_health(Ok(HealthReport::healthy()));
    h.clock.advance(Duration::from_millis(1));
    assert_eq!(supervisor.tick().await.healthy, 1);
    assert_eq!(h.registry.failure_state("s1").await.unwrap(), Default::default());
    assert!(h.runtime.get_calls().is_empty());
}

#[tokio::test]
async fn test_unsuccessful_report_counts_as_failure() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.push_health(Ok(HealthReport::failing("disk full")));

    let report = h.supervisor().tick().await;

    assert_eq!(report.failed, 1);
    assert_eq!(h.registry.failure_state("s1").await.unwrap().failure_count, 1);
}

/// Drive three failed probes, advancing past each backoff.
async fn fail_three_times(h: &Harness) -> sandbox_registry_daemon::TickReport {
    let supervisor = h.supervisor();
    supervisor.tick().await;
    h.clock.advance(Duration::from_secs(5));
    supervisor.tick().await;
    h.clock.advance(Duration::from_secs(60));
    supervisor.tick().await
}

#[tokio::test]
async fn test_eviction_after_three_failures_when_container_gone() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.set_default_health(Err("timeout"));
    h.runtime.remove("c1");

    let report = fail_three_times(&h).await;

    assert_eq!(report.evicted, 1);
    assert!(h.registry.get_container_connection("s1").await.unwrap().is_none());
    assert_eq!(h.registry.get_session_for_container("c1").await.unwrap(), None);
    assert_eq!(h.sessions.status_of("s1"), Some(SessionStatus::Stopped));
    assert_eq!(h.store.key_count(), 0);
    // Runtime only consulted once the threshold is reached
    assert_eq!(h.runtime.get_calls(), vec![RuntimeCall::Inspect("c1".to_string())]);
}

#[tokio::test]
async fn test_eviction_when_container_exited() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.set_default_health(Err("timeout"));
    h.runtime.set_state(
        "c1",
        ContainerState::NotRunning {
            status: Some("exited".to_string()),
        },
    );

    assert_eq!(fail_three_times(&h).await.evicted, 1);
    assert_eq!(h.sessions.status_of("s1"), Some(SessionStatus::Stopped));
}

#[tokio::test]
async fn test_runtime_query_error_treated_as_not_running() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.set_default_health(Err("timeout"));
    h.runtime.set_error(Some("docker daemon unreachable"));

    assert_eq!(fail_three_times(&h).await.evicted, 1);
    assert!(h.registry.get_container_connection("s1").await.unwrap().is_none());
    assert_eq!(h.sessions.status_of("s1"), Some(SessionStatus::Stopped));
}

#[tokio::test]
async fn test_threshold_reached_but_still_running_is_retained() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.tools.set_default_health(Err("timeout"));

    let report = fail_three_times(&h).await;

    assert_eq!(report.retained, 1);
    assert_eq!(report.evicted, 0);
    assert!(h.registry.get_container_connection("s1").await.unwrap().is_some());
    assert_eq!(h.sessions.status_of("s1"), Some(SessionStatus::Running));
    assert_eq!(h.registry.failure_state("s1").await.unwrap().failure_count, 3);
}

#[tokio::test]
async fn test_terminal_session_evicted_without_probe() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.sessions
        .insert(SessionRecord::new("s1", "user-1", SessionStatus::Error));

    let report = h.supervisor().tick().await;

    assert_eq!(report.evicted, 1);
    assert_eq!(h.tools.health_calls(), 0);
    assert!(h.runtime.get_calls().is_empty());
    assert!(h.registry.get_container_connection("s1").await.unwrap().is_none());
    // Terminal status is left as the session store has it
    assert_eq!(h.sessions.status_of("s1"), Some(SessionStatus::Error));
}

#[tokio::test]
async fn test_missing_session_evicted() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.sessions.remove("s1");

    let report = h.supervisor().tick().await;

    assert_eq!(report.evicted, 1);
    assert_eq!(h.tools.health_calls(), 0);
    assert!(h.registry.get_container_connection("s1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_store_error_leaves_connection_alone() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.sessions.set_fail_reads(true);

    let report = h.supervisor().tick().await;

    assert_eq!(report.held, 1);
    assert_eq!(h.tools.health_calls(), 0);
    let conn = h.registry.get_container_connection("s1").await.unwrap().unwrap();
    assert_eq!(conn.status, ContainerStatus::Running);
}

#[tokio::test]
async fn test_one_bad_connection_does_not_stop_the_tick() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    h.register_running("s2", "c2").await;
    h.tools.push_health(Err("refused"));

    let report = h.supervisor().tick().await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.healthy, 1);
}

#[tokio::test]
async fn test_lease_limits_supervision_to_one_process() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    let a = h
        .supervisor()
        .with_lease(Some(SupervisorLease::new("host-a", 90_000)));
    let b = h
        .supervisor()
        .with_lease(Some(SupervisorLease::new("host-b", 90_000)));

    assert_eq!(a.tick().await.examined, 1);
    let skipped = b.tick().await;
    assert!(skipped.lease_skipped);
    assert_eq!(skipped.examined, 0);
    assert_eq!(h.tools.health_calls(), 1);

    // Holder stops renewing; the other process takes over after the TTL
    h.clock.advance(Duration::from_secs(91));
    assert_eq!(b.tick().await.examined, 1);
    assert!(a.tick().await.lease_skipped);
}

#[tokio::test]
async fn test_lease_disabled_by_default() {
    let h = Harness::new();
    let supervisor = h.supervisor();
    assert_eq!(supervisor.lease_holder(), None);

    let config = SupervisorConfig {
        lease: LeaseConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(h.supervisor_with(&config).lease_holder().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_started_supervisor_ticks_on_interval_and_stops() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;
    let supervisor = Arc::new(h.supervisor());

    let handle = supervisor.start();
    let mut reports = handle.reports();

    reports.changed().await.unwrap();
    let first = reports.borrow_and_update().clone().unwrap();
    assert_eq!(first.examined, 1);
    assert_eq!(first.healthy, 1);

    reports.changed().await.unwrap();
    assert_eq!(h.tools.health_calls(), 2);

    assert!(handle.stop(Duration::from_secs(5)).await);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_tick() {
    let h = Harness::new();
    h.register_running("s1", "c1").await;

    let handle = Arc::new(h.supervisor()).start();
    let reports = handle.reports();

    assert!(handle.stop(Duration::from_secs(5)).await);
    assert!(reports.borrow().is_none());
    assert_eq!(h.tools.health_calls(), 0);
}
