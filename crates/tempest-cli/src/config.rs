//! CLI configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tempest_core::{DEFAULT_UDP_PORT, DEFAULT_WEBSOCKET_URL};

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://swd.weatherflow.com/swd/rest";

/// CLI configuration, loaded from a toml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Access token for the cloud channels.
    pub token: String,
    /// Station to select on startup. The first account station when unset.
    pub station_id: Option<i64>,
    /// REST endpoint.
    pub api_url: String,
    /// Push endpoint.
    pub websocket_url: String,
    /// Broadcast listener settings.
    pub udp: UdpSettings,
    /// Periodic refresh interval in seconds.
    pub refresh_interval_secs: u64,
    /// Cache database path. Platform default when unset.
    pub cache_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            station_id: None,
            api_url: DEFAULT_API_URL.to_string(),
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            udp: UdpSettings::default(),
            refresh_interval_secs: 15 * 60,
            cache_path: None,
        }
    }
}

/// Broadcast listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSettings {
    /// Whether the listener starts with the station.
    pub enabled: bool,
    /// Port to bind.
    pub port: u16,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_UDP_PORT,
        }
    }
}

/// Configuration load/save errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the config file.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the config file.
    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize the configuration.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from the default path, or defaults when the file
    /// does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }
}

/// Default config file location following platform conventions.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tempest")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.udp.enabled);
        assert_eq!(config.udp.port, DEFAULT_UDP_PORT);
        assert_eq!(config.refresh_interval_secs, 900);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("token = \"abc\"\n").unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.udp.enabled);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.token = "abc".to_string();
        config.station_id = Some(100);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.token, "abc");
        assert_eq!(loaded.station_id, Some(100));
    }
}
