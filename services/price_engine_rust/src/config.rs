//! Configuration for price_engine_rust

use anyhow::{anyhow, Result};
use bestprice_rust_core::db::DbPoolConfig;
use std::env;
use std::time::Duration;

/// Default polling interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub poll_interval: Duration,
    pub pool: DbPoolConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow!("DATABASE_URL must be set"))?;

        let poll_interval_secs = env::var("POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .clamp(0.1, 60.0);

        Ok(Self {
            database_url,
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            pool: DbPoolConfig::from_env_with_defaults(DbPoolConfig::default()),
        })
    }
}
