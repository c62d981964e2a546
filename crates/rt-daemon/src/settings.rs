use std::path::{Path, PathBuf};

use rt_core::config::RetentionConfig;
use rt_telemetry::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// The `rt-daemon` configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonFileConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl DaemonFileConfig {
    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| SettingsError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    ///
    /// Runs before logging is up, so the caller reports the returned
    /// [`ConfigSource`] once the subscriber is installed.
    pub fn load_or_default(path: &Path) -> Result<(Self, ConfigSource), SettingsError> {
        if path.exists() {
            let config = Self::load_from(path)?;
            Ok((config, ConfigSource::File(path.to_path_buf())))
        } else {
            Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())))
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The named file was absent.
    Defaults(PathBuf),
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreDriver {
    /// Durable, file-backed.
    #[default]
    Sqlite,
    /// Lost on exit; handy for trying things out.
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub driver: StoreDriver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Interval between two scheduler ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_sim_hosts")]
    pub hosts: usize,
    #[serde(default = "default_sim_services")]
    pub services_per_host: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hosts: default_sim_hosts(),
            services_per_host: default_sim_services(),
        }
    }
}

fn default_sim_hosts() -> usize {
    4
}
fn default_sim_services() -> usize {
    3
}
