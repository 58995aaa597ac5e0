//! Telemetry configuration
//!
//! Loaded from TOML:
//! - `EDGE_TELEMETRY_CONFIG` if set
//! - otherwise `<config dir>/edge-agent/telemetry.toml`
//! - defaults when no file exists
//!
//! `EXCLUDED_MONITORS` (comma separated) overrides the excluded monitor list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV: &str = "EDGE_TELEMETRY_CONFIG";
pub const EXCLUDED_MONITORS_ENV: &str = "EXCLUDED_MONITORS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not find config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Node identity, defaults to the hostname
    pub node_id: Option<String>,
    pub excluded_monitors: Vec<String>,
    pub cycle: CycleConfig,
    pub queues: QueueConfig,
    pub monitors: MonitorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub report_capacity: usize,
    pub status_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Refresh period of background monitors
    pub period_secs: u64,
    /// A background task silent for longer is respawned
    pub heartbeat_timeout_secs: u64,
    /// Grace period given to a task before it is aborted
    pub retire_timeout_secs: u64,
    /// Longest wait for an on-demand refresh before the cycle moves on
    pub refresh_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            excluded_monitors: Vec::new(),
            cycle: CycleConfig::default(),
            queues: QueueConfig::default(),
            monitors: MonitorSettings::default(),
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            report_capacity: 10,
            status_capacity: 64,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            period_secs: 15,
            heartbeat_timeout_secs: 90,
            retire_timeout_secs: 5,
            refresh_timeout_secs: 30,
        }
    }
}

impl MonitorSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn retire_timeout(&self) -> Duration {
        Duration::from_secs(self.retire_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("monitors.period_secs", self.period_secs),
            ("monitors.heartbeat_timeout_secs", self.heartbeat_timeout_secs),
            ("monitors.retire_timeout_secs", self.retire_timeout_secs),
            ("monitors.refresh_timeout_secs", self.refresh_timeout_secs),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", key)));
            }
        }
        Ok(())
    }
}

impl CycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl TelemetryConfig {
    /// Loads the config file (if any) and applies environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var(CONFIG_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::config_file_path()?,
        };

        let mut config = if path.exists() {
            info!("Loading telemetry config from {}", path.display());
            Self::from_file(&path)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(raw) = std::env::var(EXCLUDED_MONITORS_ENV) {
            config.excluded_monitors = parse_excluded(&raw);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: TelemetryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("edge-agent");
        path.push("telemetry.toml");
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle.interval_secs == 0 {
            return Err(ConfigError::Invalid("cycle.interval_secs must be positive".into()));
        }
        if self.queues.report_capacity == 0 || self.queues.status_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be positive".into()));
        }
        self.monitors.validate()
    }

    pub fn excluded(&self) -> BTreeSet<String> {
        self.excluded_monitors.iter().cloned().collect()
    }
}

/// Parses `"'power', container_stats,,"` into `["power", "container_stats"]`
pub fn parse_excluded(raw: &str) -> Vec<String> {
    raw.replace('\'', "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
