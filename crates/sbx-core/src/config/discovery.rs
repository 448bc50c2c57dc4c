//! Configuration discovery and resolution

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range or malformed
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override the shared store URL
    pub redis_url: Option<String>,
    /// Override the session store URL
    pub database_url: Option<String>,
    /// Override the supervisor interval
    pub interval_secs: Option<u64>,
}

/// Name of the working-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "sbx.toml";

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Config file: `--config`, else `./sbx.toml`, else `~/.config/sbx/config.toml`
/// 4. Defaults
///
/// An explicit `--config` path must exist and parse. Discovered files that
/// fail to parse are skipped with a warning.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Result<Config, ConfigError> {
    let mut config = match &overrides.config_path {
        Some(path) => load_config_file(path)?,
        None => discover_config_file(current_dir, home_dir)
            .and_then(|path| match load_config_file(&path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Ignoring unreadable config: {e}");
                    None
                }
            })
            .unwrap_or_default(),
    };

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, overrides);
    validate(&config)?;

    Ok(config)
}

/// Default location for the daemon status directory.
pub fn default_status_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/sbx/daemon")
}

fn discover_config_file(current_dir: &Path, home_dir: &Path) -> Option<PathBuf> {
    let local = current_dir.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let global = home_dir.join(".config/sbx/config.toml");
    if global.exists() {
        return Some(global);
    }

    None
}

/// Load config from a TOML file
fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("SBX_REDIS_URL") {
        config.redis.url = url;
    }

    if let Ok(url) = std::env::var("SBX_DATABASE_URL") {
        config.session_store.database_url = Some(url);
    }

    if let Ok(socket) = std::env::var("SBX_DOCKER_SOCKET") {
        config.docker.socket = Some(socket);
    }

    if let Ok(raw) = std::env::var("SBX_HEALTH_INTERVAL_SECS") {
        match raw.parse::<u64>() {
            Ok(secs) => config.supervisor.interval_secs = secs,
            Err(_) => warn!("Ignoring non-numeric SBX_HEALTH_INTERVAL_SECS={raw}"),
        }
    }
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(url) = &overrides.redis_url {
        config.redis.url = url.clone();
    }

    if let Some(url) = &overrides.database_url {
        config.session_store.database_url = Some(url.clone());
    }

    if let Some(secs) = overrides.interval_secs {
        config.supervisor.interval_secs = secs;
    }
}

/// Longest accepted tick interval (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.supervisor.interval_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "supervisor.interval_secs must be at least 1".to_string(),
        });
    }

    if config.supervisor.interval_secs > MAX_INTERVAL_SECS {
        return Err(ConfigError::Invalid {
            message: format!("supervisor.interval_secs must be at most {MAX_INTERVAL_SECS}"),
        });
    }

    if config.supervisor.failure_threshold == 0 {
        return Err(ConfigError::Invalid {
            message: "supervisor.failure_threshold must be at least 1".to_string(),
        });
    }

    if config.supervisor.lease.enabled
        && config.supervisor.lease.ttl_ms <= config.supervisor.interval_secs.saturating_mul(1_000)
    {
        return Err(ConfigError::Invalid {
            message: "supervisor.lease.ttl_ms must exceed the tick interval".to_string(),
        });
    }

    let table = &config.session_store.table;
    if table.is_empty()
        || !table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ConfigError::Invalid {
            message: format!("session_store.table '{table}' is not a plain identifier"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        // SAFETY: tests touching the environment are serialized with #[serial].
        unsafe {
            std::env::remove_var("SBX_REDIS_URL");
            std::env::remove_var("SBX_DATABASE_URL");
            std::env::remove_var("SBX_DOCKER_SOCKET");
            std::env::remove_var("SBX_HEALTH_INTERVAL_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_files() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.supervisor.interval_secs, 30);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379/0");
    }

    #[test]
    #[serial]
    fn test_local_file_beats_global_file() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();

        std::fs::write(
            cwd.path().join(LOCAL_CONFIG_FILE),
            "[redis]\nurl = \"redis://local:6379\"\n",
        )
        .unwrap();
        let global_dir = home.path().join(".config/sbx");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            "[redis]\nurl = \"redis://global:6379\"\n",
        )
        .unwrap();

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.redis.url, "redis://local:6379");
    }

    #[test]
    #[serial]
    fn test_global_file_used_when_no_local() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let global_dir = home.path().join(".config/sbx");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            "[supervisor]\nfailure_threshold = 5\n",
        )
        .unwrap();

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.supervisor.failure_threshold, 5);
    }

    #[test]
    #[serial]
    fn test_env_beats_file_and_cli_beats_env() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        std::fs::write(
            cwd.path().join(LOCAL_CONFIG_FILE),
            "[supervisor]\ninterval_secs = 45\n",
        )
        .unwrap();

        // SAFETY: serialized with #[serial].
        unsafe {
            std::env::set_var("SBX_HEALTH_INTERVAL_SECS", "20");
            std::env::set_var("SBX_REDIS_URL", "redis://env:6379");
        }

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.supervisor.interval_secs, 20);
        assert_eq!(config.redis.url, "redis://env:6379");

        let overrides = ConfigOverrides {
            interval_secs: Some(15),
            redis_url: Some("redis://cli:6379".to_string()),
            ..Default::default()
        };
        let config = resolve_config(&overrides, cwd.path(), home.path()).unwrap();
        assert_eq!(config.supervisor.interval_secs, 15);
        assert_eq!(config.redis.url, "redis://cli:6379");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_explicit_missing_config_is_error() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(cwd.path().join("nope.toml")),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), cwd.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    #[serial]
    fn test_unparseable_discovered_file_is_skipped() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(LOCAL_CONFIG_FILE), "this is = = not toml").unwrap();

        let config = resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        assert_eq!(config.supervisor.interval_secs, 30);
    }

    #[test]
    #[serial]
    fn test_zero_interval_rejected() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            interval_secs: Some(0),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), cwd.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    #[serial]
    fn test_oversized_interval_rejected() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        std::fs::write(
            cwd.path().join(LOCAL_CONFIG_FILE),
            "[supervisor.lease]\nenabled = true\n",
        )
        .unwrap();

        for secs in [MAX_INTERVAL_SECS + 1, u64::MAX] {
            let overrides = ConfigOverrides {
                interval_secs: Some(secs),
                ..Default::default()
            };
            let err = resolve_config(&overrides, cwd.path(), cwd.path()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{secs}");
        }

        let overrides = ConfigOverrides {
            interval_secs: Some(MAX_INTERVAL_SECS),
            ..Default::default()
        };
        // Valid interval, but the default lease TTL no longer exceeds it
        let err = resolve_config(&overrides, cwd.path(), cwd.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    #[serial]
    fn test_table_name_must_be_identifier() {
        clear_env();
        let cwd = TempDir::new().unwrap();
        std::fs::write(
            cwd.path().join(LOCAL_CONFIG_FILE),
            "[session_store]\ntable = \"sessions; DROP TABLE x\"\n",
        )
        .unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(cwd.path().join(LOCAL_CONFIG_FILE)),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), cwd.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_default_status_dir() {
        let dir = default_status_dir(Path::new("/home/dev"));
        assert_eq!(dir, PathBuf::from("/home/dev/.config/sbx/daemon"));
    }
}
