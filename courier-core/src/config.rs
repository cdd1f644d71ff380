//! Application configuration management.
//!
//! Handles loading and saving the backend endpoint, credentials, and sync
//! timing knobs. Configuration is persisted as TOML on disk; every field has
//! a default so a partial file is always valid.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{CourierError, CourierResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Message-source backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Scheduler and service timing.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Message-source backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g. "https://xyz.supabase.co/functions/v1").
    #[serde(default)]
    pub base_url: String,

    /// API key sent as `apikey` and as a bearer token.
    #[serde(default)]
    pub api_key: String,

    /// Chat scope whose messages are mirrored.
    #[serde(default)]
    pub chat_id: String,

    /// Path of the paged read endpoint.
    #[serde(default = "default_messages_path")]
    pub messages_path: String,

    /// Path of the upstream sync trigger endpoint.
    #[serde(default = "default_trigger_path")]
    pub trigger_path: String,

    /// Messages requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Extra HTTP headers as key-value pairs.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Sync timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between healthy syncs.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Retry delay after the first failure; doubles per failure.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound on the retry delay (before jitter).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Random extra delay as a fraction of the computed delay, 0.0 to 1.0.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Failures after which the delay stays at `backoff_max_ms`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Bound on one sync attempt, trigger call included.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Delay before stopping once the last subscriber leaves.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,

    /// Number of most recent messages delivered to message subscribers.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,

    /// Ask the backend to pull from upstream before every fetch.
    #[serde(default)]
    pub trigger_upstream: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses the platform default.
    #[serde(default)]
    pub directory: String,

    /// Write JSON lines to the log file instead of plain text.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_messages_path() -> String {
    constants::DEFAULT_MESSAGES_PATH.to_string()
}

fn default_trigger_path() -> String {
    constants::DEFAULT_TRIGGER_PATH.to_string()
}

fn default_page_size() -> u32 {
    constants::DEFAULT_PAGE_SIZE
}

fn default_request_timeout() -> u64 {
    constants::DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_poll_interval() -> u64 {
    constants::DEFAULT_POLL_INTERVAL_MS
}

fn default_backoff_base() -> u64 {
    constants::DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_max() -> u64 {
    constants::DEFAULT_BACKOFF_MAX_MS
}

fn default_jitter_ratio() -> f64 {
    constants::DEFAULT_JITTER_RATIO
}

fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_ATTEMPTS
}

fn default_fetch_timeout() -> u64 {
    constants::DEFAULT_FETCH_TIMEOUT_MS
}

fn default_stop_grace() -> u64 {
    constants::DEFAULT_STOP_GRACE_MS
}

fn default_snapshot_limit() -> usize {
    constants::DEFAULT_SNAPSHOT_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            chat_id: String::new(),
            messages_path: default_messages_path(),
            trigger_path: default_trigger_path(),
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout(),
            custom_headers: HashMap::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            jitter_ratio: default_jitter_ratio(),
            max_attempts: default_max_attempts(),
            fetch_timeout_ms: default_fetch_timeout(),
            stop_grace_ms: default_stop_grace(),
            snapshot_limit: default_snapshot_limit(),
            trigger_upstream: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms))
    }

    /// Jitter ratio clamped to `[0, 1]`; NaN counts as no jitter.
    pub fn jitter_ratio(&self) -> f64 {
        if self.jitter_ratio.is_nan() {
            0.0
        } else {
            self.jitter_ratio.clamp(0.0, 1.0)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check that everything needed to reach the backend is present.
    pub fn validate(&self) -> CourierResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CourierError::MissingConfig("backend.base_url".into()));
        }
        if self.chat_id.trim().is_empty() {
            return Err(CourierError::MissingConfig("backend.chat_id".into()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from the default config file path, or defaults
    /// when no file exists yet.
    pub fn load_default() -> CourierResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> CourierResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path, creating parent dirs.
    pub fn save_to_file(&self, path: &Path) -> CourierResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> CourierResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CourierError::Config(format!("failed to serialize config: {e}")))
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> CourierResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> CourierResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Platform::log_dir()
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Normalize a backend base URL.
    ///
    /// Strips quotes and whitespace, defaults to https when no scheme is
    /// given (plain http only for localhost), and drops trailing slashes.
    pub fn sanitize_base_url(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
            format!("http://{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backend.request_timeout_ms, 30_000);
        assert_eq!(config.backend.messages_path, "/messages");
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(30));
        assert!(!config.sync.trigger_upstream);
        assert_eq!(config.logging.level, "info");
        assert!(config.backend.validate().is_err());
    }

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(
            AppConfig::sanitize_base_url("abc.supabase.co/functions/v1/"),
            "https://abc.supabase.co/functions/v1"
        );
        assert_eq!(
            AppConfig::sanitize_base_url("localhost:54321"),
            "http://localhost:54321"
        );
        assert_eq!(
            AppConfig::sanitize_base_url("  \"https://example.com/\"  "),
            "https://example.com"
        );
        assert_eq!(AppConfig::sanitize_base_url("   "), "");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [backend]
            base_url = "https://example.com"
            chat_id = "-100123"

            [sync]
            poll_interval_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.poll_interval_ms, 5000);
        assert_eq!(config.sync.backoff_base_ms, 2_000);
        assert_eq!(config.backend.page_size, 100);
        assert!(config.backend.validate().is_ok());
    }

    #[test]
    fn test_jitter_ratio_is_clamped() {
        let mut sync = SyncConfig::default();
        sync.jitter_ratio = 3.0;
        assert_eq!(sync.jitter_ratio(), 1.0);
        sync.jitter_ratio = -1.0;
        assert_eq!(sync.jitter_ratio(), 0.0);
        sync.jitter_ratio = f64::NAN;
        assert_eq!(sync.jitter_ratio(), 0.0);
    }

    #[test]
    fn test_backoff_max_never_below_base() {
        let mut sync = SyncConfig::default();
        sync.backoff_base_ms = 10_000;
        sync.backoff_max_ms = 1_000;
        assert_eq!(sync.backoff_max(), Duration::from_secs(10));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = AppConfig::default();
        config.backend.base_url = "https://example.com".into();
        config.sync.stop_grace_ms = 500;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.backend.base_url, "https://example.com");
        assert_eq!(loaded.sync.stop_grace_ms, 500);
    }
}
