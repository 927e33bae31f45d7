// src/config.rs

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Orders are simulated unless this is explicitly enabled.
    #[serde(default)]
    pub live_trading: bool,
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// When set, logs go to a daily-rolling file in this directory instead of stdout.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_testnet() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_state_file() -> String {
    "bot_state.json".to_string()
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(Environment::with_prefix("APP"));

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        // Exchange credentials come from the environment (or a .env file),
        // never from Settings.toml.
        if let Ok(key) = std::env::var("BINANCE_API_KEY") {
            config.api_key = key;
        }
        if let Ok(secret) = std::env::var("BINANCE_SECRET_KEY") {
            config.secret_key = secret;
        }

        Ok(config)
    }
}
