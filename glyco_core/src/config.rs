//! Configuration file support for Glyco.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/glyco/config.toml`.
//! Every field has a default, so a partial file only overrides what it names.

use crate::{Error, ModelParameters, Result, ThresholdConfig};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub model: ModelParameters,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Treatment fetch cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Polling configuration for `glyco watch`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// How far back treatments are fetched for IOB/COB
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

/// Presentation settings
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    /// Offset from UTC used for hour-of-day and per-day grouping
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl DisplayConfig {
    /// The configured offset, falling back to UTC when out of range
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local/share")
    });
    base.join("glyco")
}

fn default_ttl_seconds() -> u64 {
    30
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_lookback_hours() -> i64 {
    24
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        });
        base.join("glyco").join("config.toml")
    }

    /// Save the current configuration to a specific path
    ///
    /// Writes a temp file in the same directory and renames it into place.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Check the preconditions the engine relies on.
    ///
    /// The numeric core does not re-check these.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.very_low < t.low && t.low < t.high && t.high < t.very_high) {
            return Err(Error::Config(format!(
                "thresholds must satisfy very_low < low < high < very_high (got {} / {} / {} / {})",
                t.very_low, t.low, t.high, t.very_high
            )));
        }

        let m = &self.model;
        if m.dia_hours <= 0.0 {
            return Err(Error::Config(format!(
                "dia_hours must be positive (got {})",
                m.dia_hours
            )));
        }
        if m.carb_absorption_rate <= 0.0 {
            return Err(Error::Config(format!(
                "carb_absorption_rate must be positive (got {})",
                m.carb_absorption_rate
            )));
        }
        if m.basal_rate < 0.0 {
            return Err(Error::Config(format!(
                "basal_rate must not be negative (got {})",
                m.basal_rate
            )));
        }

        if self.cache.ttl_seconds >= self.monitor.poll_interval_seconds {
            return Err(Error::Config(format!(
                "cache ttl ({}s) must be shorter than the poll interval ({}s)",
                self.cache.ttl_seconds, self.monitor.poll_interval_seconds
            )));
        }
        if self.monitor.lookback_hours <= 0 {
            return Err(Error::Config("lookback_hours must be positive".into()));
        }

        if FixedOffset::east_opt(self.display.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(Error::Config(format!(
                "utc_offset_minutes out of range (got {})",
                self.display.utc_offset_minutes
            )));
        }

        Ok(())
    }
}
