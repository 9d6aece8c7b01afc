//! Server configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reaper::{DEFAULT_IDLE_AFTER_SECS, DEFAULT_SWEEP_INTERVAL_SECS};

/// Environment variable overriding the shared secret from the config file.
pub const SECRET_ENV_VAR: &str = "SENSEI_SHARED_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the gateway binds.
    pub listen_addr: String,
    /// Shared secret for connection-token verification.
    pub shared_secret: String,
    /// Base URL of the external agent service.
    pub agent_service_url: String,
    /// Seconds of inactivity before a session is reaped.
    pub reap_idle_after_secs: u64,
    /// Seconds between reaper sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7470".to_string(),
            shared_secret: "change-me".to_string(),
            agent_service_url: "http://127.0.0.1:8600".to_string(),
            reap_idle_after_secs: DEFAULT_IDLE_AFTER_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Default config file location under the local data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the local data directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
        path.push("sensei");
        path.push("server.toml");
        Ok(path)
    }

    /// Load from `path` (or the default location), falling back to
    /// defaults when the file does not exist. `SENSEI_SHARED_SECRET`
    /// overrides the file's secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config at {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(secret) = std::env::var(SECRET_ENV_VAR) {
            config.shared_secret = secret;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_documented_reaper_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.reap_idle_after_secs, 1800);
        assert_eq!(config.sweep_interval_secs, 300);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: ServerConfig =
            toml::from_str("listen_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.reap_idle_after_secs, DEFAULT_IDLE_AFTER_SECS);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = ServerConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let back: ServerConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.listen_addr, config.listen_addr);
        assert_eq!(back.shared_secret, config.shared_secret);
    }
}
