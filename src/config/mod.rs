//! Configuration loading and validation.
//!
//! Settings are loaded from a TOML file; every field has a default so an
//! empty file (or no file at all) yields a working configuration.

pub mod logging;
pub mod pool;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use logging::LoggingConfig;
use pool::PoolConfig;

/// Aggregated settings for the state pool subsystem.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from a TOML file and validate them.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::InvalidValue {
            field: "path",
            reason: e.to_string(),
        })?;
        let settings: Settings = toml::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
            field: "toml",
            reason: e.to_string(),
        })?;
        settings.pool.validate()?;
        Ok(settings)
    }
}
