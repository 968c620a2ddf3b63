//! Application configuration
//!
//! One TOML file under the user config directory, every section optional.
//! Missing or absent sections fall back to defaults so the scale works out
//! of the box; only an unreadable or malformed file is an error.

use std::fs;
use std::path::PathBuf;

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::board::calibration::CalibrationSettings;
use crate::board::dispatcher::DispatcherSettings;
use crate::mqtt::MqttSettings;
use crate::weight::ScaleSettings;

const CONFIG_DIR: &str = "boardscale";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttSettings,
    pub scale: ScaleSettings,
    pub calibration: CalibrationSettings,
    pub dispatcher: DispatcherSettings,
}

impl Config {
    /// Loads the configuration, falling back to defaults when no file
    /// exists.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::path() else {
            warn!("no config directory on this system, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .wrap_err_with(|| format!("couldn't read config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .wrap_err_with(|| format!("couldn't parse config file {}", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }
}
