//! Bootstrap configuration and root folder resolution
//!
//! Settings come from (highest priority first):
//! 1. Command-line arguments (parsed by each binary)
//! 2. Environment variables
//! 3. TOML config file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the root folder (database lives here)
pub const ROOT_FOLDER_ENV: &str = "MIXCRITIC_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "mixcritic.db";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional in the file; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and service state
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path (overrides `root_folder/mixcritic.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub critic: CriticConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or full filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// External critique service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Base URL of the critique/analysis service
    #[serde(default = "default_critic_url")]
    pub base_url: String,

    /// Bearer token for the critique service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound for a single external call
    #[serde(default = "default_critic_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum spacing between outgoing requests
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            base_url: default_critic_url(),
            api_key: None,
            timeout_secs: default_critic_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

impl CriticConfig {
    /// Per-call deadline; never below one second
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Job pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Jobs processed concurrently (independent tracks only)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Interval advertised to polling clients while jobs are active
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A running job older than this is failed by the watchdog
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// How often the watchdog sweeps
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,

    /// Max time spent retrying a write on SQLite lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval_ms(),
            stale_after_secs: default_stale_after_secs(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_critic_url() -> String {
    "http://127.0.0.1:8787/v1".to_string()
}

fn default_critic_timeout_secs() -> u64 {
    180
}

fn default_min_request_interval_ms() -> u64 {
    250
}

fn default_max_concurrent() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_stale_after_secs() -> u64 {
    600
}

fn default_watchdog_interval_secs() -> u64 {
    30
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

/// Parse a TOML config from a string
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load a TOML config file
///
/// A missing file is not an error: defaults are returned so a fresh install
/// starts without any configuration.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!("Config file not found, using defaults: {}", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    parse_toml_config(&content)
}

/// Default config file location (`~/.config/mixcritic/<service>.toml`)
pub fn default_config_path(service_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mixcritic").join(format!("{}.toml", service_name)))
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Resolve the database path: explicit TOML path, else `<root>/mixcritic.db`
pub fn resolve_database_path(root_folder: &Path, toml_config: &TomlConfig) -> PathBuf {
    toml_config
        .database_path
        .clone()
        .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE))
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mixcritic"))
        .unwrap_or_else(|| PathBuf::from("./mixcritic_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = parse_toml_config("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.jobs.poll_interval_ms, 3000);
        assert_eq!(config.critic.timeout_secs, 180);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_toml_config(
            r#"
            port = 6100

            [critic]
            base_url = "https://critic.example.com/v1"
            api_key = "secret"

            [jobs]
            max_concurrent = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(6100));
        assert_eq!(config.critic.base_url, "https://critic.example.com/v1");
        assert_eq!(config.critic.api_key.as_deref(), Some("secret"));
        assert_eq!(config.critic.min_request_interval_ms, 250);
        assert_eq!(config.jobs.max_concurrent, 2);
        assert_eq!(config.jobs.stale_after_secs, 600);
    }

    #[test]
    fn test_zero_critic_timeout_is_clamped() {
        let config = parse_toml_config("[critic]\ntimeout_secs = 0").unwrap();
        assert_eq!(config.critic.timeout_secs, 0);
        assert_eq!(config.critic.call_timeout(), Duration::from_secs(1));
        assert_eq!(
            CriticConfig::default().call_timeout(),
            Duration::from_secs(180)
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_toml_config("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_root_folder_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_database_path_resolution() {
        let config = TomlConfig::default();
        assert_eq!(
            resolve_database_path(Path::new("/data"), &config),
            PathBuf::from("/data/mixcritic.db")
        );

        let config = TomlConfig {
            database_path: Some(PathBuf::from("/elsewhere/jobs.db")),
            ..Default::default()
        };
        assert_eq!(
            resolve_database_path(Path::new("/data"), &config),
            PathBuf::from("/elsewhere/jobs.db")
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_toml_config(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(config, TomlConfig::default());
    }
}
