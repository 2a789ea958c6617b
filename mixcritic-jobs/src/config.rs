//! Configuration resolution for mixcritic-jobs
//!
//! Priority: command line → environment → TOML → defaults. Root folder and
//! database path resolution live in `mixcritic_common::config`; this module
//! adds what only this service needs.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use mixcritic_common::config::{resolve_database_path, resolve_root_folder, TomlConfig};

/// Environment variable holding the critique service API key
pub const CRITIC_API_KEY_ENV: &str = "MIXCRITIC_CRITIC_API_KEY";

/// Port used when neither the command line nor TOML names one
pub const DEFAULT_PORT: u16 = 5780;

/// Resolved service settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub toml: TomlConfig,
}

impl ServiceConfig {
    /// Merge command-line values over the TOML file
    pub fn resolve(cli_port: Option<u16>, cli_root_folder: Option<&Path>, toml: TomlConfig) -> Self {
        let root_folder = resolve_root_folder(cli_root_folder, &toml);
        let database_path = resolve_database_path(&root_folder, &toml);
        let port = cli_port.or(toml.port).unwrap_or(DEFAULT_PORT);

        Self {
            port,
            root_folder,
            database_path,
            toml,
        }
    }
}

/// Resolve the critique service API key
///
/// **Priority:** ENV → TOML. A missing key is allowed (a local critique
/// service may not require one).
pub fn resolve_critic_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(CRITIC_API_KEY_ENV)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .critic
        .api_key
        .clone()
        .filter(|key| is_valid_key(key));

    match (env_key, toml_key) {
        (Some(env_key), Some(_)) => {
            warn!("Critic API key found in environment and TOML. Using environment (highest priority).");
            Some(env_key)
        }
        (Some(env_key), None) => {
            info!("Critic API key loaded from environment variable");
            Some(env_key)
        }
        (None, Some(toml_key)) => {
            info!("Critic API key loaded from TOML config");
            Some(toml_key)
        }
        (None, None) => {
            warn!("No critic API key configured; requests will be unauthenticated");
            None
        }
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Tracing filter directive for a configured level
///
/// A bare level (`debug`) applies to this service's crates and the HTTP
/// layer; anything containing `=` is used verbatim.
pub fn log_filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') {
        level.to_string()
    } else {
        format!(
            "mixcritic_jobs={level},mixcritic_common={level},tower_http={level}",
            level = level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_port_overrides_toml() {
        let toml = TomlConfig {
            port: Some(6000),
            root_folder: Some(PathBuf::from("/srv/mixcritic")),
            ..Default::default()
        };

        let config = ServiceConfig::resolve(Some(7000), None, toml.clone());
        assert_eq!(config.port, 7000);

        let config = ServiceConfig::resolve(None, Some(Path::new("/tmp/mc")), toml);
        assert_eq!(config.port, 6000);
        assert_eq!(config.root_folder, PathBuf::from("/tmp/mc"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/mc/mixcritic.db"));
    }

    #[test]
    fn test_default_port() {
        let config = ServiceConfig::resolve(None, Some(Path::new("/tmp/mc")), TomlConfig::default());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc123"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn test_log_filter_directive() {
        assert_eq!(
            log_filter_directive("debug"),
            "mixcritic_jobs=debug,mixcritic_common=debug,tower_http=debug"
        );
        assert_eq!(log_filter_directive("warn,mixcritic_jobs=trace"), "warn,mixcritic_jobs=trace");
    }
}
