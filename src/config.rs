//! Environment configuration.

use std::str::FromStr;

use thiserror::Error;

use crate::services::StorefrontSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got `{value}`")]
    Invalid { name: &'static str, value: String, expected: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Postgres connection string. Without one the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub port: u16,
    pub low_stock_threshold: u32,
    pub recent_orders_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        let settings = StorefrontSettings::default();
        Self {
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            port: 8083,
            low_stock_threshold: settings.low_stock_threshold,
            recent_orders_limit: settings.recent_orders_limit,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_url: present("DATABASE_URL"),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", "positive integer")?
                .unwrap_or(defaults.database_max_connections),
            nats_url: present("NATS_URL"),
            port: parse(&lookup, "PORT", "port number")?.unwrap_or(defaults.port),
            low_stock_threshold: parse(&lookup, "LOW_STOCK_THRESHOLD", "non-negative integer")?
                .unwrap_or(defaults.low_stock_threshold),
            recent_orders_limit: parse(&lookup, "RECENT_ORDERS_LIMIT", "non-negative integer")?
                .unwrap_or(defaults.recent_orders_limit),
        })
    }

    pub fn settings(&self) -> StorefrontSettings {
        StorefrontSettings {
            low_stock_threshold: self.low_stock_threshold,
            recent_orders_limit: self.recent_orders_limit,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value, expected }),
    }
}
