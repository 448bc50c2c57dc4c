//! Single-supervisor lease

use crate::store::SharedStateStore;
use sandbox_registry_core::config::LeaseConfig;
use sandbox_registry_core::keys::SUPERVISOR_LEASE;
use tracing::{debug, warn};

/// TTL'd lease on `containers:meta:supervisorLease`.
///
/// The holder renews it at the start of every tick. A TTL longer than the
/// tick interval keeps it held between ticks; a crashed holder loses it after
/// one TTL.
#[derive(Debug, Clone)]
pub struct SupervisorLease {
    holder: String,
    ttl_ms: u64,
}

impl SupervisorLease {
    pub fn new(holder: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            holder: holder.into(),
            ttl_ms,
        }
    }

    /// Lease with a holder id unique to this process: `{hostname}-{uuid}`.
    pub fn for_this_process(config: &LeaseConfig) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(format!("{host}-{}", uuid::Uuid::new_v4()), config.ttl_ms)
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Take or renew the lease. Store errors count as not holding it.
    pub async fn try_acquire(&self, store: &SharedStateStore, now_ms: i64) -> bool {
        match store
            .acquire_lease(SUPERVISOR_LEASE, &self.holder, self.ttl_ms, now_ms)
            .await
        {
            Ok(held) => {
                if !held {
                    debug!("Supervisor lease held by another process");
                }
                held
            }
            Err(e) => {
                warn!("Failed to acquire supervisor lease: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStateStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_holder_locked_out_until_expiry() {
        let store: SharedStateStore = Arc::new(MemoryStateStore::new());
        let a = SupervisorLease::new("a", 1_000);
        let b = SupervisorLease::new("b", 1_000);

        assert!(a.try_acquire(&store, 0).await);
        assert!(!b.try_acquire(&store, 500).await);
        assert!(a.try_acquire(&store, 900).await);
        assert!(!b.try_acquire(&store, 1_500).await);
        assert!(b.try_acquire(&store, 2_000).await);
    }

    #[tokio::test]
    async fn test_store_failure_means_not_held() {
        let memory = Arc::new(MemoryStateStore::new());
        memory.set_fail_writes(true);
        let store: SharedStateStore = memory;
        assert!(!SupervisorLease::new("a", 1_000).try_acquire(&store, 0).await);
    }

    #[test]
    fn test_holder_is_unique_per_process_instance() {
        let config = LeaseConfig::default();
        let a = SupervisorLease::for_this_process(&config);
        let b = SupervisorLease::for_this_process(&config);
        assert_ne!(a.holder(), b.holder());
    }
}
