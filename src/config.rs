//! Worker configuration gathered from the environment.

use crate::error::ConfigError;
use std::time::Duration;

const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
const DEFAULT_SPORT_KEY: &str = "basketball_nba";
const DEFAULT_REGIONS: &str = "us";
const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 60;

/// Everything the worker needs, resolved once at startup. Collaborators
/// receive values from here instead of reading the environment
/// themselves, so tests can build a `Config` directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub odds_api_key: String,
    pub database_url: String,
    pub database_password: String,
    pub nats_url: String,
    pub sport_key: String,
    pub regions: String,
    pub cycle_interval: Duration,
}

impl Config {
    /// Read configuration from the environment. A missing required
    /// variable fails startup before any cycle runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            odds_api_key: require("ODDS_API_KEY")?,
            database_url: require("DATABASE_URL")?,
            database_password: require("DATABASE_PASSWORD")?,
            nats_url: optional("NATS_URL", DEFAULT_NATS_URL),
            sport_key: optional("SPORT_KEY", DEFAULT_SPORT_KEY),
            regions: optional("ODDS_REGIONS", DEFAULT_REGIONS),
            cycle_interval: Duration::from_secs(cycle_interval_secs()?),
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn cycle_interval_secs() -> Result<u64, ConfigError> {
    match std::env::var("CYCLE_INTERVAL_SECS") {
        Err(_) => Ok(DEFAULT_CYCLE_INTERVAL_SECS),
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidVar {
            var: "CYCLE_INTERVAL_SECS",
            reason: format!("expected a number of seconds, got {:?}", value),
        }),
    }
}
