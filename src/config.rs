// src/config.rs
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::DEFAULT_SWEEP_INTERVAL;

pub const ENV_PREFIX: &str = "RESIDENCY_";
const SECS_PER_HOUR: u64 = 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {0}")]
    Env(#[from] envy::Error),
    #[error("RESIDENCY_SWEEP_INTERVAL_HOURS must be greater than zero")]
    ZeroInterval,
    #[error("RESIDENCY_SWEEP_INTERVAL_HOURS is too large: {0}")]
    IntervalTooLarge(u64),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_sweep_interval_hours() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs() / SECS_PER_HOUR
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8085
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        if config.sweep_interval_hours == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if config.sweep_interval_hours.checked_mul(SECS_PER_HOUR).is_none() {
            return Err(ConfigError::IntervalTooLarge(config.sweep_interval_hours));
        }
        Ok(config)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours.saturating_mul(SECS_PER_HOUR))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
