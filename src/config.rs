//! Configuration using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (default `config/parspace.toml`, missing file is fine)
//! 2. environment variables prefixed with `PARSPACE_`, nested keys separated
//!    by `__` (e.g. `PARSPACE_RUN__READY_TIMEOUT=30s`)
//!
//! Every field has a default, so an empty configuration is valid.
//!
//! # Example
//! ```no_run
//! use parspace::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Data goes to {}", settings.storage.data_dir.display());
//! # Ok::<(), parspace::error::ParspaceError>(())
//! ```

use crate::error::{ParspaceError, Result};
use crate::estimate::{EstimatorConfig, DEFAULT_OVERHEAD_MS};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/parspace.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Traversal loop timing
    #[serde(default)]
    pub run: RunSettings,
    /// Where data files go
    #[serde(default)]
    pub storage: StorageSettings,
    /// Post-run sync script
    #[serde(default)]
    pub sync: SyncSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Traversal loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Cooperative sleep after every row
    #[serde(with = "humantime_serde", default = "default_point_yield")]
    pub point_yield: Duration,
    /// Sleep between readiness polls
    #[serde(with = "humantime_serde", default = "default_ready_poll_interval")]
    pub ready_poll_interval: Duration,
    /// Give up on a readiness poll after this long (`None` waits forever)
    #[serde(with = "humantime_serde", default = "default_ready_timeout")]
    pub ready_timeout: Option<Duration>,
    /// Fixed software overhead per step used by the time estimator
    #[serde(default = "default_loop_overhead_ms")]
    pub loop_overhead_ms: f64,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory for data files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Post-run sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Run the sync script after every traversal
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// User passed to the data sink and the sync script
    #[serde(default)]
    pub user: Option<String>,
    /// Directory holding the `rsync` / `rsync.bat` script
    #[serde(default)]
    pub exec_dir: Option<PathBuf>,
    /// Explicit script path, overrides `exec_dir`
    #[serde(default)]
    pub script: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_point_yield() -> Duration {
    Duration::from_millis(1)
}

fn default_ready_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_ready_timeout() -> Option<Duration> {
    Some(Duration::from_secs(600))
}

fn default_loop_overhead_ms() -> f64 {
    DEFAULT_OVERHEAD_MS
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("parspace"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            point_yield: default_point_yield(),
            ready_poll_interval: default_ready_poll_interval(),
            ready_timeout: default_ready_timeout(),
            loop_overhead_ms: default_loop_overhead_ms(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            user: None,
            exec_dir: None,
            script: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment, then validate.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file and the environment, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PARSPACE_").split("__"))
            .extract()?;
        settings.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(settings)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ParspaceError::Config(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid logging.format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.run.ready_poll_interval.is_zero() {
            return invalid("run.ready_poll_interval must be greater than zero".into());
        }
        if self.run.ready_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return invalid("run.ready_timeout must be greater than zero when set".into());
        }
        if !self.run.loop_overhead_ms.is_finite() || self.run.loop_overhead_ms < 0.0 {
            return invalid(format!(
                "run.loop_overhead_ms must be a non-negative number, got {}",
                self.run.loop_overhead_ms
            ));
        }
        Ok(())
    }

    /// Estimator tuning derived from the run settings.
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            overhead_ms: self.run.loop_overhead_ms,
        }
    }

    /// User for data files and the sync script, `"Default"` when unset.
    pub fn user(&self) -> &str {
        self.sync.user.as_deref().unwrap_or("Default")
    }

    /// Serialize as TOML, e.g. to write a starter configuration file.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ParspaceError::Config(e.to_string()))
    }
}
