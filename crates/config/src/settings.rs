//! Process-level settings
//!
//! Loaded once at startup from `parley.toml` (if present) with `PARLEY_*`
//! environment overrides, e.g. `PARLEY_SERVER__PORT=8080`.

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_calls")]
    pub max_concurrent_calls: usize,
    /// Base URL this worker advertises for carrier stream callbacks
    #[serde(default)]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_calls() -> usize {
    200
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_calls: default_max_calls(),
            public_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScyllaSettings {
    #[serde(default = "default_scylla_hosts")]
    pub hosts: Vec<String>,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
    #[serde(default)]
    pub enabled: bool,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_keyspace() -> String {
    "parley".to_string()
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for ScyllaSettings {
    fn default() -> Self {
        Self {
            hosts: default_scylla_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            enabled: false,
        }
    }
}

/// Vendor credentials. Empty keys disable the corresponding vendor; calls
/// routed to a disabled vendor fail the session setup, not the process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorKeys {
    #[serde(default)]
    pub carrier_api_key: String,
    #[serde(default)]
    pub deepgram_api_key: String,
    #[serde(default)]
    pub soniox_api_key: String,
    #[serde(default)]
    pub assemblyai_api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub groq_api_key: String,
    #[serde(default)]
    pub xai_api_key: String,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default)]
    pub elevenlabs_api_key: String,
    #[serde(default)]
    pub cartesia_api_key: String,
    #[serde(default)]
    pub hume_api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub scylla: ScyllaSettings,
    #[serde(default)]
    pub vendors: VendorKeys,
}

impl Settings {
    /// Load from `parley.toml` + `PARLEY_*` env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::with_name("parley").required(false))
            .add_source(Environment::with_prefix("PARLEY").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.max_concurrent_calls, 200);
        assert!(!s.redis.enabled);
        assert_eq!(s.scylla.keyspace, "parley");
    }
}
