//! Configuration for the lookup engine
//!
//! Handles loading from TOML files and environment variables and provides
//! the optional per-instance overrides accepted by [`crate::TxData::new`].

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Public nodes used when the caller does not supply any
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "wss://xrplcluster.com",
    "wss://xrpl.link",
    "wss://s2.ripple.com",
];

/// Optional overrides; unset or zero values keep the defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDataOptions {
    /// Connect + query budget for a single endpoint
    pub endpoint_timeout_ms: Option<u64>,

    /// Budget for the whole lookup (raised to a per-endpoint floor)
    pub overall_timeout_ms: Option<u64>,

    /// Accept nodes that do not hold the full ledger history
    pub allow_no_full_history: Option<bool>,
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxDataConfig {
    /// Candidate websocket endpoints, in preference order
    pub endpoints: Vec<String>,

    /// Per-endpoint timeout in milliseconds
    pub endpoint_timeout_ms: u64,

    /// Overall lookup timeout in milliseconds
    pub overall_timeout_ms: u64,

    /// Accept nodes without full history
    pub allow_no_full_history: bool,
}

fn default_endpoint_timeout() -> u64 { 1250 }
fn default_overall_timeout() -> u64 { 10_000 }

impl Default for TxDataConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            endpoint_timeout_ms: default_endpoint_timeout(),
            overall_timeout_ms: default_overall_timeout(),
            allow_no_full_history: false,
        }
    }
}

impl TxDataConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from the environment (and `.env`, if present)
    ///
    /// Expected format: `TXDATA_ENDPOINTS=url1,url2,url3`. Unset variables
    /// keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(endpoints) = std::env::var("TXDATA_ENDPOINTS") {
            config.endpoints = endpoints
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(ms) = env_parse::<u64>("TXDATA_ENDPOINT_TIMEOUT_MS")? {
            config.endpoint_timeout_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("TXDATA_OVERALL_TIMEOUT_MS")? {
            config.overall_timeout_ms = ms;
        }
        if let Some(allow) = env_parse::<bool>("TXDATA_ALLOW_NO_FULL_HISTORY")? {
            config.allow_no_full_history = allow;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "endpoint_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.overall_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "overall_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply caller overrides, ignoring values below 1
    pub fn with_options(mut self, options: &TxDataOptions) -> Self {
        if let Some(ms) = options.endpoint_timeout_ms.filter(|ms| *ms >= 1) {
            self.endpoint_timeout_ms = ms;
        }
        if let Some(ms) = options.overall_timeout_ms.filter(|ms| *ms >= 1) {
            self.overall_timeout_ms = ms;
        }
        if let Some(allow) = options.allow_no_full_history {
            self.allow_no_full_history = allow;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
