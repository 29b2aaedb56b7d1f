//! Application configuration, persisted as TOML in the user's config directory
//!
//! Missing file: a default one is written. Unparsable file: defaults are used
//! and the file is left untouched so the user can fix it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn, Level};

use crate::device::ControllerType;

const CONFIG_DIR: &str = ".config/procontrol";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the active configuration came from
#[derive(Debug)]
pub enum ConfigOrigin {
    File(PathBuf),
    CreatedDefault(PathBuf),
    /// No file existed and writing the defaults failed
    DefaultNotSaved(ConfigError),
    /// The file exists but could not be used; it is left untouched
    DefaultAfterError(ConfigError),
}

impl ConfigOrigin {
    pub fn report(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigOrigin::CreatedDefault(path) => {
                info!("No config found, wrote defaults to {}", path.display())
            }
            ConfigOrigin::DefaultNotSaved(e) | ConfigOrigin::DefaultAfterError(e) => {
                warn!("{}, using default config", e)
            }
        }
    }
}

/// Backend building the console link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process backend, no Bluetooth involved
    #[default]
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controller_type: ControllerType,
    pub transport: TransportKind,
    pub monitor_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub unpair_timeout_secs: u64,
    pub work_queue_capacity: usize,
    /// Reconnect on loss without asking
    pub auto_reconnect: bool,
    pub require_root: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            controller_type: ControllerType::ProController,
            transport: TransportKind::Loopback,
            monitor_interval_ms: 1000,
            shutdown_timeout_ms: 2000,
            unpair_timeout_secs: 10,
            work_queue_capacity: 256,
            auto_reconnect: false,
            require_root: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `$HOME/.config/procontrol/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| {
            warn!("Could not determine home directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn load_or_default() -> (Self, ConfigOrigin) {
        Self::load_or_default_from(&Self::default_path())
    }

    /// Never logs; the caller reports the origin once a subscriber is up.
    pub fn load_or_default_from(path: &Path) -> (Self, ConfigOrigin) {
        if !path.exists() {
            let config = Self::default();
            let origin = match config.save_to(path) {
                Ok(()) => ConfigOrigin::CreatedDefault(path.to_path_buf()),
                Err(e) => ConfigOrigin::DefaultNotSaved(e),
            };
            return (config, origin);
        }

        match Self::load_from(path) {
            Ok(config) => (config, ConfigOrigin::File(path.to_path_buf())),
            Err(e) => (Self::default(), ConfigOrigin::DefaultAfterError(e)),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        fs::write(path, content).map_err(write_error)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn unpair_timeout(&self) -> Duration {
        Duration::from_secs(self.unpair_timeout_secs)
    }

    /// Unknown values fall back to `INFO`.
    pub fn log_level(&self) -> Level {
        self.log_level.trim().parse().unwrap_or(Level::INFO)
    }
}
