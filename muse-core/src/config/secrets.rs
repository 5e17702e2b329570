//! Secrets configuration loaded from environment variables only.
//!
//! This module handles sensitive configuration like the API key shared by
//! the client and the remote endpoint. Secrets are never written to disk.

use std::env;

/// Secrets loaded exclusively from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// Shared API key (env: MUSE_API_KEY). Sent as `x-api-key` by the client
    /// and required by the server when present.
    pub api_key: Option<String>,
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// This function also loads .env file if present (for development),
    /// but production should rely on actual environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self::from_env_inner()
    }

    /// Internal method to load from environment without loading .env
    pub(crate) fn from_env_inner() -> Self {
        Self {
            api_key: env::var("MUSE_API_KEY")
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}
