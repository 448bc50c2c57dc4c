//! Probe backoff after failures

use sandbox_registry_core::config::SupervisorConfig;
use std::time::Duration;

/// Deferral schedule for failed probes.
///
/// One short deferral after the first failure, a long one after each later
/// failure. The threshold decides when the runtime is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub first: Duration,
    pub repeat: Duration,
    pub threshold: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            first: Duration::from_millis(config.first_backoff_ms),
            repeat: Duration::from_millis(config.repeat_backoff_ms),
            threshold: config.failure_threshold.max(1),
        }
    }

    /// Deferral after the `failure_count`-th consecutive failure.
    pub fn delay_for(&self, failure_count: u32) -> Duration {
        if failure_count <= 1 {
            self.first
        } else {
            self.repeat
        }
    }

    /// Epoch millis before which the next probe must not run.
    pub fn next_check_after(&self, failure_count: u32, now_ms: i64) -> i64 {
        let delay = i64::try_from(self.delay_for(failure_count).as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(delay)
    }

    pub fn threshold_reached(&self, failure_count: u32) -> bool {
        failure_count >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(7), Duration::from_secs(60));
        assert_eq!(policy.threshold, 3);
    }

    #[test]
    fn test_next_check_after() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next_check_after(1, 1_000), 6_000);
        assert_eq!(policy.next_check_after(2, 1_000), 61_000);
        assert_eq!(policy.next_check_after(2, i64::MAX - 1), i64::MAX);
    }

    #[test]
    fn test_threshold() {
        let policy = BackoffPolicy::default();
        assert!(!policy.threshold_reached(2));
        assert!(policy.threshold_reached(3));
        assert!(policy.threshold_reached(4));
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let config = SupervisorConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert_eq!(BackoffPolicy::from_config(&config).threshold, 1);
    }
}
