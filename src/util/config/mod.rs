//! Runtime configuration
//!
//! Scheduler and logging settings, loaded from TOML with per-field defaults.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (DEFERRED_LOG)
//! 2. Config file ($DEFERRED_CONFIG, else ~/.config/deferred/config.toml)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use deferred::util::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str("[scheduler]\njob_budget = 100\n").unwrap();
//! assert_eq!(config.scheduler.job_budget, Some(100));
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;


/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DEFERRED_CONFIG";

/// Environment variable overriding the log level.
pub const LOG_ENV: &str = "DEFERRED_LOG";

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Event loop settings
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// `[scheduler]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Idle poll timeout in milliseconds
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Maximum jobs per run call
    #[serde(default)]
    pub job_budget: Option<usize>,
    /// Report rejections nobody handles
    #[serde(default = "default_true")]
    pub track_unhandled_rejections: bool,
    /// Collect statistics
    #[serde(default)]
    pub enable_stats: bool,
}

fn default_idle_timeout_ms() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10,
            job_budget: None,
            track_unhandled_rejections: true,
            enable_stats: false,
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum level
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Colored output
    #[serde(default)]
    pub ansi: bool,
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            ansi: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scheduler configuration for [`EventLoop::install`](crate::EventLoop::install).
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::from(&self.scheduler)
    }

    /// Apply `DEFERRED_LOG` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env_overrides_from<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_ENV) {
            self.log.level = level.parse().map_err(|_| ConfigError::InvalidEnv {
                key: LOG_ENV,
                value: level,
            })?;
        }
        Ok(())
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("deferred"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("deferred"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("deferred"));
    }

    None
}

/// Get the config file path: `$DEFERRED_CONFIG`, else `<config dir>/config.toml`
pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let content = fs::read_to_string(path)?;
    RuntimeConfig::from_toml_str(&content)
}

/// Load the user-level config with environment overrides applied.
/// Returns defaults if the file doesn't exist.
pub fn load_user_config() -> Result<RuntimeConfig, ConfigError> {
    let mut config = match get_config_path() {
        Some(path) if path.exists() => load_config(&path)?,
        _ => RuntimeConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Save a config file, creating parent directories as needed.
pub fn save_config(
    config: &RuntimeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}

/// Save the user-level config.
pub fn save_user_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config(config, &path)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Cannot determine config directory")]
    NoConfigDir,
}
