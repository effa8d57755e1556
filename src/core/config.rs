// src/core/config.rs

//! # Engine Configuration
//!
//! Tunables for a [`Context`](crate::core::context::Context), read from a small
//! TOML file. Every key is optional:
//!
//! ```toml
//! mask = "<hidden>"
//! max_resolution_depth = 16
//! target_version = "2.1"
//! interactive = true
//! ```

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILENAME, DEFAULT_MASK, DEFAULT_MAX_RESOLUTION_DEPTH,
};
use crate::core::version::Version;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration file '{0}' does not exist.")]
    NotFound(String),
    #[error("Could not determine the user's configuration directory.")]
    NoConfigDir,
}

type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Replaces sensitive values in log lines.
    pub mask: String,
    /// Longest prerequisite chain resolution will follow.
    pub max_resolution_depth: usize,
    /// Commands, parameters and settings outside this version are unavailable.
    pub target_version: Option<Version>,
    /// Ask for missing arguments instead of failing.
    pub interactive: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mask: DEFAULT_MASK.to_string(),
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            target_version: None,
            interactive: false,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Loaded engine configuration from '{}': {:?}", path.display(), config);
        Ok(config)
    }

    /// `<user config dir>/cascade/cascade.toml`.
    pub fn default_path() -> ConfigResult<PathBuf> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
    }

    /// Loads an explicitly requested file (which must exist; `~` is expanded),
    /// otherwise the default file if there is one, otherwise the defaults.
    pub fn load_or_default(explicit: Option<&str>) -> ConfigResult<Self> {
        if let Some(raw) = explicit {
            let expanded = shellexpand::tilde(raw);
            return Self::load(Path::new(expanded.as_ref()));
        }

        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path),
            Ok(_) | Err(ConfigError::NoConfigDir) => {
                log::debug!("No configuration file found. Using defaults.");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}
