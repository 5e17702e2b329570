//! Settings configuration loaded from TOML files.
//!
//! This module handles non-sensitive configuration stored in TOML format
//! in the XDG config directory (~/.config/muse/config.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# muse configuration file
# Located at: ~/.config/muse/config.toml
#
# This file contains non-sensitive configuration.
# Secrets are loaded from environment variables:
#   - MUSE_API_KEY (optional, sent as x-api-key / required by the server when set)

[server]
host = "127.0.0.1"
port = 3000

[remote]
base_url = "http://127.0.0.1:3000"
timeout_seconds = 10

[storage]
# local_db_path = "/path/to/local.sqlite3"   # defaults to <data dir>/muse/local.sqlite3
# remote_db_path = "/path/to/remote.sqlite3" # defaults to <data dir>/muse/remote.sqlite3

[sync]
interval_seconds = 60

[logging]
level = "info"
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Remote endpoint server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Where the client finds the remote endpoint
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Database file locations
    #[serde(default)]
    pub storage: StorageSettings,

    /// Periodic sync configuration
    #[serde(default)]
    pub sync: SyncSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    /// Base URL of the remote endpoint; notes live under `/notes`
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,

    /// Per-request timeout. A timed out request counts as a remote failure.
    #[serde(default = "default_remote_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_db_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    /// Seconds between two passes of `muse watch`
    #[serde(default = "default_sync_interval_seconds")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_remote_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_remote_timeout_seconds() -> u64 {
    10
}

fn default_sync_interval_seconds() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            timeout_seconds: default_remote_timeout_seconds(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_sync_interval_seconds(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/muse/config.toml`,
    /// or `$MUSE_CONFIG_DIR/config.toml` when set.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("MUSE_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("muse");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the HTTP bind address of the server.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Full URL of the notes resource on the remote endpoint.
    pub fn notes_url(&self) -> String {
        format!("{}/notes", self.remote.base_url.trim_end_matches('/'))
    }
}
