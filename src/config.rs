//! Startup configuration.
//!
//! One TOML file, read once at startup. A missing file means the defaults;
//! a file that exists but does not parse is a startup failure, never a
//! silent fallback.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::astro::{Margins, Observer};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("cannot parse config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    pub listen_port: u16,
    pub observatory: ObservatoryConfig,
    pub scriptor: ScriptorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObservatoryConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Solar elevation below which it is astronomical night, degrees.
    pub night_horizon: f64,
    /// Solar elevation of ordinary sunrise/sunset, degrees.
    pub day_horizon: f64,
    /// Seconds before sunset at which evening begins.
    pub evening_time: f64,
    /// Seconds after sunrise at which morning ends.
    pub morning_time: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScriptorConfig {
    pub generator: PathBuf,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            listen_port: 5557,
            observatory: ObservatoryConfig::default(),
            scriptor: ScriptorConfig::default(),
        }
    }
}

impl Default for ObservatoryConfig {
    fn default() -> Self {
        Self {
            latitude: 37.1,
            longitude: -2.5,
            night_horizon: -10.0,
            day_horizon: 0.0,
            evening_time: 7200.0,
            morning_time: 1800.0,
        }
    }
}

impl Default for ScriptorConfig {
    fn default() -> Self {
        Self { generator: PathBuf::from("/etc/obsbus/scriptor") }
    }
}

impl ObsConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.to_path_buf(), err))?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse(path.to_path_buf(), err))
    }

    pub fn observer(&self) -> Observer {
        Observer {
            latitude_deg: self.observatory.latitude,
            longitude_deg: self.observatory.longitude,
        }
    }

    pub fn margins(&self) -> Margins {
        Margins {
            evening_s: self.observatory.evening_time,
            morning_s: self.observatory.morning_time,
        }
    }
}
