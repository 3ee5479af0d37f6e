use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub broker_url: String,
    pub stream_url: String,
    pub flush_interval: Duration,
    pub reconnect_interval: Duration,
    pub consumer_group: String,
    pub api_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite:ballots.db"),
            broker_url: var_or("BROKER_URL", "redis://127.0.0.1:6379"),
            stream_url: var_or("STREAM_URL", "http://127.0.0.1:8000/stream"),
            flush_interval: parse_secs("FLUSH_INTERVAL_SECS", env::var("FLUSH_INTERVAL_SECS").ok(), 1)?,
            reconnect_interval: parse_secs(
                "RECONNECT_INTERVAL_SECS",
                env::var("RECONNECT_INTERVAL_SECS").ok(),
                60,
            )?,
            consumer_group: var_or("CONSUMER_GROUP", "counter"),
            api_addr: var_or("API_ADDR", "0.0.0.0:8080"),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_secs(key: &str, raw: Option<String>, default: u64) -> Result<Duration> {
    let secs = match raw {
        None => default,
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number of seconds, got {:?}", key, raw)))?,
    };
    if secs == 0 {
        return Err(Error::Config(format!("{} must be at least one second", key)));
    }
    Ok(Duration::from_secs(secs))
}
