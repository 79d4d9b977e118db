use std::fs;
use std::time::Duration;

use anyhow::Result;
use portico_upstream::bootstrap::BootstrapConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5099".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Bot token; prefer the CLI flag or PORTICO_UPSTREAM_TOKEN over
    /// writing it here.
    pub token: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub bootstrap_max_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub bootstrap_poll_interval_ms: u64,
    #[serde(default = "default_rebuild_attempt")]
    pub bootstrap_rebuild_attempt: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token: None,
            bootstrap_max_attempts: default_max_attempts(),
            bootstrap_poll_interval_ms: default_poll_interval_ms(),
            bootstrap_rebuild_attempt: default_rebuild_attempt(),
        }
    }
}

impl UpstreamConfig {
    pub fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            max_attempts: self.bootstrap_max_attempts,
            poll_interval: Duration::from_millis(self.bootstrap_poll_interval_ms),
            rebuild_attempt: self.bootstrap_rebuild_attempt,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_rebuild_attempt() -> u32 {
    3
}

fn default_history_limit() -> u8 {
    portico_relay::DEFAULT_HISTORY_LIMIT
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("PORTICO_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("PORTICO_HISTORY_LIMIT") {
            if let Ok(parsed) = value.parse::<u8>() {
                config.relay.history_limit = parsed;
            }
        }
        Ok(config)
    }
}
