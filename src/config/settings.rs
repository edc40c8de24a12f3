//! Configuration settings for rallysync.
//!
//! Settings are loaded from `~/.rallysync/config.yaml`. The remote URL and API
//! key can be overridden with `RALLYSYNC_REMOTE_URL` and `RALLYSYNC_API_KEY`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::RallyError;
use crate::features::sync::RetryPolicy;

/// Environment variable overriding `remote.url`.
pub const REMOTE_URL_ENV: &str = "RALLYSYNC_REMOTE_URL";
/// Environment variable overriding `remote.api_key`.
pub const API_KEY_ENV: &str = "RALLYSYNC_API_KEY";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote backend settings.
    pub remote: RemoteConfig,
    /// Queue replay settings.
    pub sync: SyncConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the PostgREST-compatible backend. `None` keeps rallysync offline.
    #[serde(default)]
    pub url: Option<String>,
    /// API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Queue replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempts per replayed operation before it is re-queued.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single retry delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// How often `watch` probes the backend for connectivity.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_retry_attempts() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1000
}

const fn default_retry_max_delay_ms() -> u64 {
    30_000
}

const fn default_probe_interval_secs() -> u64 {
    15
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl RemoteConfig {
    /// Check whether a backend URL is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// Retry policy applied to each replayed operation.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Connectivity probe interval as a `Duration`.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl Config {
    /// Load configuration from the default path, then apply environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, RallyError> {
        let paths = Paths::new()?;
        let mut config = Self::load_from_path(&paths.config_file)?;
        config.apply_overrides(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(API_KEY_ENV).ok(),
        );
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, RallyError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RallyError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            RallyError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Replace remote settings with values taken from the environment.
    pub fn apply_overrides(&mut self, url: Option<String>, api_key: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.remote.url = Some(url);
        }
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            self.remote.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert!(!config.remote.is_configured());
        assert_eq!(config.remote.timeout_secs, 10);
        assert_eq!(config.sync.retry_attempts, 3);
        assert_eq!(config.sync.retry_base_delay_ms, 1000);
        assert_eq!(config.sync.probe_interval_secs, 15);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Pretty);
    }

    #[test]
    fn test_load_written_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.remote.url = Some("https://team.example.com".to_string());
        config.sync.retry_attempts = 5;

        std::fs::write(&config_path, serde_yaml::to_string(&config).unwrap()).unwrap();
        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.remote.url.as_deref(), Some("https://team.example.com"));
        assert_eq!(loaded.sync.retry_attempts, 5);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
sync:
  retry_attempts: 1
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.sync.retry_attempts, 1);
        assert_eq!(config.sync.retry_max_delay_ms, 30_000);
        assert_eq!(config.remote.timeout_secs, 10);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync: [not, a, map").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, RallyError::Config(_)));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.remote.url = Some("https://old.example.com".to_string());

        config.apply_overrides(Some("https://new.example.com".to_string()), None);
        assert_eq!(config.remote.url.as_deref(), Some("https://new.example.com"));
        assert!(config.remote.api_key.is_none());

        config.apply_overrides(Some("  ".to_string()), Some("secret".to_string()));
        assert_eq!(config.remote.url.as_deref(), Some("https://new.example.com"));
        assert_eq!(config.remote.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = SyncConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }
}
