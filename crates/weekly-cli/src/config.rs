use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::time::Duration;
use weekly_core::gateway::http::DEFAULT_BASE_URL;
use weekly_core::models::EngineConfig;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Every edit is sent as soon as it is made
    #[default]
    Auto,
    /// Edits are buffered locally and sent together as one update
    Manual,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Base URL of the remote task API
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// SQLite file holding the local document
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub save_mode: SaveMode,
    /// Filter directive for log output, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub persist_shifted_positions: bool,
    #[serde(default)]
    pub resync_after_move: bool,
}

fn default_gateway_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_database_path() -> String {
    "weekly.db".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            database_path: default_database_path(),
            request_timeout_secs: default_request_timeout_secs(),
            save_mode: SaveMode::default(),
            log_level: default_log_level(),
            persist_shifted_positions: true,
            resync_after_move: false,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("weekly.toml"))
            .merge(Env::prefixed("WEEKLY_"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            persist_shifted_positions: self.persist_shifted_positions,
            resync_after_move: self.resync_after_move,
        }
    }
}
