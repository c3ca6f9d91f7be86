// src/config.rs
//! Runtime configuration.
//!
//! Values come from defaults overridden by `PLC_*` environment variables
//! (a `.env` file is loaded by the binary before this runs):
//! - `PLC_DIRECTORY_URL`: directory base URL (default: http://localhost:2582)
//! - `PLC_REQUEST_TIMEOUT_MS`: deadline for each HTTP call
//! - `PLC_MAX_CREATE_ATTEMPTS`: submissions tried by `create`
//! - `PLC_RETRIES_PER_KEY`: attempts per rotation key for update/deactivate
//! - `PLC_INITIAL_BACKOFF_MS` / `PLC_MAX_BACKOFF_MS`: delay between attempts
//! - `PLC_VERIFY_AUDIT_LOG`: check the fetched chain before writing to it

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

pub const DEFAULT_DIRECTORY_URL: &str = "http://localhost:2582";
pub const DEFAULT_MAX_CREATE_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRIES_PER_KEY: usize = 5;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub directory_url: String,
    pub request_timeout_ms: u64,
    pub max_create_attempts: usize,
    pub retries_per_key: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub verify_audit_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            request_timeout_ms: 10_000,
            max_create_attempts: DEFAULT_MAX_CREATE_ATTEMPTS,
            retries_per_key: DEFAULT_RETRIES_PER_KEY,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            verify_audit_log: true,
        }
    }
}

impl Settings {
    /// Loads settings from the `PLC_` environment prefix on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(
            Environment::with_prefix("PLC").try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        builder
            .set_default("directory_url", defaults.directory_url)?
            .set_default("request_timeout_ms", defaults.request_timeout_ms as i64)?
            .set_default("max_create_attempts", defaults.max_create_attempts as i64)?
            .set_default("retries_per_key", defaults.retries_per_key as i64)?
            .set_default("initial_backoff_ms", defaults.initial_backoff_ms as i64)?
            .set_default("max_backoff_ms", defaults.max_backoff_ms as i64)?
            .set_default("verify_audit_log", defaults.verify_audit_log)?
            .build()?
            .try_deserialize()
    }
}
