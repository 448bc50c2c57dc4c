//! Configuration resolution
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables
//! 3. Config file (`--config`, `./sbx.toml`, `~/.config/sbx/config.toml`)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{
    ConfigError, ConfigOverrides, LOCAL_CONFIG_FILE, MAX_INTERVAL_SECS, default_status_dir,
    resolve_config,
};
pub use types::{
    Config, DaemonConfig, DockerConfig, LeaseConfig, RedisConfig, SessionStoreConfig,
    SupervisorConfig, ToolServerConfig,
};
