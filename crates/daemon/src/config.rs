//! Configuration management for the AudioBrowser daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/audiobrowser/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the root directory.
pub const ROOT_DIR_ENV: &str = "FILES_BASE_PATH";

/// Environment variable that overrides the log level.
pub const LOG_LEVEL_ENV: &str = "AUDIOBROWSER_LOG_LEVEL";

/// Upper bound for the watcher debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("files.root_dir is not set (use the config file or {ROOT_DIR_ENV})")]
    RootDirUnset,

    #[error("files.root_dir does not exist: {0}")]
    RootDirMissing(PathBuf),

    #[error("files.root_dir is not a directory: {0}")]
    RootDirNotDirectory(PathBuf),

    #[error("watcher.debounce_ms must be at most {MAX_DEBOUNCE_MS}, got {0}")]
    InvalidDebounce(u64),

    #[error("watcher.queue_capacity must be greater than 0")]
    InvalidQueueCapacity,

    #[error("watcher.temp_suffix must not be empty")]
    EmptyTempSuffix,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the AudioBrowser daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Served files configuration.
    pub files: FilesConfig,

    /// Directory watcher configuration.
    pub watcher: WatcherConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Served files configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FilesConfig {
    /// Absolute path of the directory whose files are served.
    pub root_dir: Option<PathBuf>,
}

/// Directory watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    /// Window in milliseconds used to coalesce bursts of events (0 disables).
    pub debounce_ms: u64,

    /// Also report in-place content modifications.
    pub include_modified: bool,

    /// Entry names ending with this suffix are treated as in-progress writes.
    pub temp_suffix: String,

    /// Capacity of the raw event queue between the OS watch and the filter loop.
    pub queue_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            include_modified: false,
            temp_suffix: "tmp".to_string(),
            queue_capacity: 256,
        }
    }
}

impl WatcherConfig {
    /// The debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audiobrowser")
        .join("config.toml")
}

impl Config {
    /// Create a configuration serving `root_dir` with default settings.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.files.root_dir = Some(root_dir.into());
        config
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILES_BASE_PATH: Override the served root directory
    /// - AUDIOBROWSER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var(ROOT_DIR_ENV) {
            if !root.is_empty() {
                tracing::info!("Overriding root_dir from environment: {}", root);
                self.files.root_dir = Some(PathBuf::from(root));
            }
        }

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// The root directory must exist and be a directory; this is the
    /// fail-fast startup check for the whole core.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = self.files.root_dir.as_ref().ok_or(ConfigError::RootDirUnset)?;
        if !root.exists() {
            return Err(ConfigError::RootDirMissing(root.clone()));
        }
        if !root.is_dir() {
            return Err(ConfigError::RootDirNotDirectory(root.clone()));
        }

        if self.watcher.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::InvalidDebounce(self.watcher.debounce_ms));
        }

        if self.watcher.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }

        if self.watcher.temp_suffix.is_empty() {
            return Err(ConfigError::EmptyTempSuffix);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn valid_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (Config::with_root(temp_dir.path()), temp_dir)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.files.root_dir, None);
        assert_eq!(config.watcher.debounce_ms, 300);
        assert!(!config.watcher.include_modified);
        assert_eq!(config.watcher.temp_suffix, "tmp");
        assert_eq!(config.watcher.queue_capacity, 256);
    }

    #[test]
    fn test_debounce_duration() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[files]
root_dir = "/srv/music"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.files.root_dir, Some(PathBuf::from("/srv/music")));
        assert_eq!(config.watcher, WatcherConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"

[files]
root_dir = "/srv/music"

[watcher]
debounce_ms = 0
include_modified = true
temp_suffix = ".part"
queue_capacity = 16
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.watcher.debounce_ms, 0);
        assert!(config.watcher.include_modified);
        assert_eq!(config.watcher.temp_suffix, ".part");
        assert_eq!(config.watcher.queue_capacity, 16);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("invalid [ toml");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut config = Config::with_root("/srv/music");
        config.watcher.debounce_ms = 500;

        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::with_root(temp_dir.path());
        config.save(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("audiobrowser"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_validate_ok() {
        let (config, _temp_dir) = valid_config();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_root_unset() {
        assert_eq!(Config::default().validate(), Err(ConfigError::RootDirUnset));
    }

    #[test]
    fn test_validate_root_missing() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let config = Config::with_root(&missing);
        assert_eq!(config.validate(), Err(ConfigError::RootDirMissing(missing)));
    }

    #[test]
    fn test_validate_root_not_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.mp3");
        fs::write(&file, "x").unwrap();

        let config = Config::with_root(&file);
        assert_eq!(config.validate(), Err(ConfigError::RootDirNotDirectory(file)));
    }

    #[test]
    fn test_validate_debounce_bounds() {
        let (mut config, _temp_dir) = valid_config();
        config.watcher.debounce_ms = MAX_DEBOUNCE_MS;
        assert!(config.validate().is_ok());

        config.watcher.debounce_ms = MAX_DEBOUNCE_MS + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDebounce(MAX_DEBOUNCE_MS + 1))
        );
    }

    #[test]
    fn test_validate_queue_capacity_zero() {
        let (mut config, _temp_dir) = valid_config();
        config.watcher.queue_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueCapacity));
    }

    #[test]
    fn test_validate_empty_temp_suffix() {
        let (mut config, _temp_dir) = valid_config();
        config.watcher.temp_suffix = String::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyTempSuffix));
    }

    #[test]
    fn test_validate_log_level() {
        let (mut config, _temp_dir) = valid_config();
        config.daemon.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_root_dir() {
        std::env::set_var(ROOT_DIR_ENV, "/srv/from-env");

        let mut config = Config::with_root("/srv/from-file");
        config.apply_env_overrides();
        assert_eq!(config.files.root_dir, Some(PathBuf::from("/srv/from-env")));

        std::env::remove_var(ROOT_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var(ROOT_DIR_ENV, "");
        std::env::remove_var(LOG_LEVEL_ENV);

        let mut config = Config::with_root("/srv/from-file");
        config.apply_env_overrides();
        assert_eq!(config.files.root_dir, Some(PathBuf::from("/srv/from-file")));

        std::env::remove_var(ROOT_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var(ROOT_DIR_ENV);
        std::env::set_var(LOG_LEVEL_ENV, "trace");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "trace");
        assert_eq!(config.files.root_dir, None);

        std::env::remove_var(LOG_LEVEL_ENV);
    }
}
