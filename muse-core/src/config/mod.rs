//! Configuration management for muse.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `MUSE_API_KEY` - shared key between client and remote endpoint (optional)
//!
//! ## Settings (TOML File)
//! Located at `~/.config/muse/config.toml`:
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [remote]
//! base_url = "http://127.0.0.1:3000"
//! timeout_seconds = 10
//!
//! [sync]
//! interval_seconds = 60
//!
//! [logging]
//! level = "info"
//! ```

mod secrets;
mod settings;

use std::time::Duration;

pub use secrets::Secrets;
pub use settings::{
    LoggingSettings, RemoteSettings, ServerSettings, Settings, SettingsError, StorageSettings,
    SyncSettings,
};

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid remote base_url '{url}': {reason}")]
    InvalidRemoteUrl { url: String, reason: String },

    #[error("remote.timeout_seconds must be greater than zero")]
    ZeroTimeout,
}

impl Config {
    /// Load configuration from all sources and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        let settings = Settings::load()?;
        Self::from_parts(secrets, settings)
    }

    /// Validate already loaded parts.
    pub fn from_parts(secrets: Secrets, settings: Settings) -> Result<Self, ConfigError> {
        let base_url = settings.remote.base_url.trim();
        let parsed = url::Url::parse(base_url).map_err(|e| ConfigError::InvalidRemoteUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidRemoteUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if settings.remote.timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(Self { secrets, settings })
    }

    /// Get the HTTP bind address of the server.
    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }

    /// Full URL of the notes resource on the remote endpoint.
    pub fn notes_url(&self) -> String {
        self.settings.notes_url()
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.remote.timeout_seconds)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.settings.sync.interval_seconds.max(1))
    }

    pub fn api_key(&self) -> Option<&str> {
        self.secrets.api_key()
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &str {
        &self.settings.logging.level
    }
}
