//! Shared configuration used across the nimbus crates.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global application configuration (gateway + engine + sessions). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown by the status endpoint.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the sled inventory used by the fixture cloud.
    pub storage_path: String,
    /// Understanding engine mode ("mock" or "live").
    pub llm_mode: String,
    /// Model identifier sent to the live engine.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    /// Conversations untouched for longer than this are treated as expired.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,
    /// How often the gateway purges expired conversations from memory.
    #[serde(default = "default_sweep_interval")]
    pub session_sweep_interval_secs: u64,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_idle_timeout() -> u64 {
    900
}

fn default_sweep_interval() -> u64 {
    60
}

impl CoreConfig {
    /// Idle window after which a pending conversation expires.
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs.max(1))
    }

    /// Interval of the background session sweeper (never zero).
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }

    /// Load config from file and environment. Precedence: env `NIMBUS__*` > `NIMBUS_CONFIG` path
    /// (default `config/gateway.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("NIMBUS_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Nimbus Gateway")?
            .set_default("port", 8001_i64)?
            .set_default("storage_path", "./data")?
            .set_default("llm_mode", "mock")?
            .set_default("llm_model", default_llm_model())?
            .set_default("session_idle_timeout_secs", default_idle_timeout() as i64)?
            .set_default("session_sweep_interval_secs", default_sweep_interval() as i64)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("NIMBUS").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "Nimbus Gateway".to_string(),
            port: 8001,
            storage_path: "./data".to_string(),
            llm_mode: "mock".to_string(),
            llm_model: default_llm_model(),
            session_idle_timeout_secs: default_idle_timeout(),
            session_sweep_interval_secs: default_sweep_interval(),
        }
    }
}
