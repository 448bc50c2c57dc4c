//! Wiring of the registry and its collaborators from configuration

use crate::registry::ContainerRegistry;
use crate::runtime::{DockerRuntime, SharedContainerRuntime};
use crate::session_store::{DetachedSessionStore, PostgresSessionStore, SharedSessionStore};
use crate::store::{RedisStateStore, SharedStateStore};
use crate::tool_client::HttpToolServerClient;
use anyhow::{Context, Result};
use sandbox_registry_core::config::{Config, default_status_dir};
use sandbox_registry_core::{SharedClock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Everything a daemon command needs.
#[derive(Clone)]
pub struct DaemonContext {
    pub config: Arc<Config>,
    pub registry: ContainerRegistry,
    pub runtime: SharedContainerRuntime,
}

impl DaemonContext {
    pub fn new(config: Config, registry: ContainerRegistry, runtime: SharedContainerRuntime) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            runtime,
        }
    }

    /// Connect to Redis, Postgres, and Docker as configured.
    ///
    /// # Errors
    ///
    /// Fails if `session_store.database_url` is unset or any backend
    /// refuses the connection.
    pub async fn connect(config: Config) -> Result<Self> {
        let database_url = config
            .session_store
            .database_url
            .clone()
            .context("session_store.database_url is not set (use SBX_DATABASE_URL or --database-url)")?;

        let store = connect_state_store(&config).await?;

        let sessions = PostgresSessionStore::connect(&database_url, &config.session_store.table)
            .await
            .context("Failed to connect to the session store")?;
        info!("Connected to session store");

        let runtime = connect_runtime(&config)?;
        let registry = build_registry(&config, store, Arc::new(sessions));
        Ok(Self::new(config, registry, runtime))
    }

    /// Status directory from config, else the default under `home_dir`.
    pub fn status_dir(&self, home_dir: &std::path::Path) -> PathBuf {
        self.config
            .daemon
            .status_dir
            .clone()
            .unwrap_or_else(|| default_status_dir(home_dir))
    }
}

/// Registry over the shared state store alone, for commands that only read
/// or delete connections. Registration and supervision need [`DaemonContext`].
///
/// # Errors
///
/// Fails if the shared state store refuses the connection.
pub async fn connect_registry(config: &Config) -> Result<ContainerRegistry> {
    let store = connect_state_store(config).await?;
    Ok(build_registry(config, store, Arc::new(DetachedSessionStore)))
}

/// Docker client as configured.
///
/// # Errors
///
/// Fails if the Docker endpoint settings are unusable.
pub fn connect_runtime(config: &Config) -> Result<SharedContainerRuntime> {
    let runtime = DockerRuntime::connect(&config.docker).context("Failed to set up Docker client")?;
    Ok(Arc::new(runtime))
}

async fn connect_state_store(config: &Config) -> Result<SharedStateStore> {
    let store = RedisStateStore::connect(&config.redis.url)
        .await
        .context("Failed to connect to the shared state store")?;
    info!("Connected to shared state store");
    Ok(Arc::new(store))
}

fn build_registry(
    config: &Config,
    store: SharedStateStore,
    sessions: SharedSessionStore,
) -> ContainerRegistry {
    let tools = HttpToolServerClient::new(&config.tool_server);
    let clock: SharedClock = Arc::new(SystemClock);
    ContainerRegistry::new(store, sessions, Arc::new(tools), clock)
}
