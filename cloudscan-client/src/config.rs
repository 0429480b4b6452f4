//! Client configuration
//!
//! Resolution order: built-in defaults, then `<config_dir>/cloudscan/config.json`,
//! then `CLOUDSCAN_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::infra::api_client::normalize_base_url;
use crate::infra::storage::{FileHandleSlot, HandleStoreError};

pub const ENV_SERVER_URL: &str = "CLOUDSCAN_SERVER_URL";
pub const ENV_POLL_INTERVAL: &str = "CLOUDSCAN_POLL_INTERVAL";
pub const ENV_MAX_POLL_FAILURES: &str = "CLOUDSCAN_MAX_POLL_FAILURES";
pub const ENV_STATE_DIR: &str = "CLOUDSCAN_STATE_DIR";

const CONFIG_DIR_NAME: &str = "cloudscan";
const CONFIG_FILE_NAME: &str = "config.json";

/// Default cadence of the status check
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("server URL must not be empty")]
    EmptyServerUrl,

    #[error("unable to determine config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    /// Consecutive failed ticks before polling is suspended. `None` keeps
    /// polling through any number of transient failures.
    pub max_consecutive_failures: Option<u32>,
    /// Directory holding the persisted job handle
    pub state_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_consecutive_failures: None,
            state_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load defaults, the user config file and environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Apply `CLOUDSCAN_*` overrides through an injectable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval = humantime::parse_duration(raw.trim())
                .map_err(|e| ConfigError::InvalidEnv {
                    key: ENV_POLL_INTERVAL,
                    reason: e.to_string(),
                })?;
        }
        if let Some(raw) = lookup(ENV_MAX_POLL_FAILURES) {
            let raw = raw.trim();
            self.max_consecutive_failures = if raw.is_empty() || raw == "0" {
                None
            } else {
                Some(raw.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidEnv {
                        key: ENV_MAX_POLL_FAILURES,
                        reason: e.to_string(),
                    }
                })?)
            };
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.state_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::EmptyServerUrl);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Server URL with scheme and without trailing slash
    pub fn normalized_server_url(&self) -> String {
        normalize_base_url(&self.server_url)
    }

    /// File slot for the persisted job handle
    pub fn handle_slot(&self) -> Result<FileHandleSlot, HandleStoreError> {
        match &self.state_dir {
            Some(dir) => Ok(FileHandleSlot::in_dir(dir)),
            None => FileHandleSlot::default_location(),
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        std::fs::write(path, content).map_err(write_err)
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
