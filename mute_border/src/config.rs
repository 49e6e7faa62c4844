//! On-disk configuration (`~/.mute-border/config.json`).
//!
//! Every field has a default, so a partial file is backfilled and a missing
//! or broken one falls back to defaults entirely.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const CONFIG_DIR: &str = ".mute-border";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve home directory")]
    NoHomeDir,
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub obs: ObsConfig,
    pub wave_link: WaveLinkConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ObsConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Input to watch; auto-detected when unset.
    pub input_name: Option<String>,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: String::new(),
            input_name: None,
        }
    }
}

impl ObsConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WaveLinkConfig {
    pub enabled: bool,
}

impl Default for WaveLinkConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Never fails: a missing file is created with defaults, an unreadable or
    /// corrupt one is reported and replaced by defaults in memory.
    pub fn load(&self) -> Config {
        if !self.config_path.exists() {
            let config = Config::default();
            match self.save(&config) {
                Ok(()) => info!(path = %self.config_path.display(), "wrote default config"),
                Err(e) => warn!(error = %e, "failed to create default config file, using defaults in memory"),
            }
            return config;
        }

        let raw = match fs::read_to_string(&self.config_path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.config_path.display(), error = %e, "failed to read config, using defaults");
                return Config::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.config_path.display(), error = %e, "failed to parse config, using defaults");
                Config::default()
            }
        }
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let serialized = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, serialized).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })
    }
}
