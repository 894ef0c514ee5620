//! Runtime configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! registry_owner = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
//! whitelisted = ["0x0101010101010101010101010101010101010101"]
//!
//! [exchange]
//! rearmable = true
//! default_duration = 3600
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! Every section except `registry_owner` is optional.

use std::path::Path;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::access::AccessRegistry;
use crate::error::{PartyError, Result};
use crate::types::Address;

/// Top-level config file structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Administers the host whitelist
    pub registry_owner: Address,
    /// Hosts whitelisted at startup
    #[serde(default)]
    pub whitelisted: Vec<Address>,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Behaviour shared by the exchange variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Allow `Sold -> Created` for repeated buy/sell cycles
    pub rearmable: bool,
    /// Listing lifetime in seconds when the caller gives none
    pub default_duration: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber. `RUST_LOG` overrides `level`.
    ///
    /// Does nothing if a global subscriber is already installed.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let installed = match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).try_init(),
            _ => fmt().with_env_filter(filter).try_init(),
        };
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }
}

impl Config {
    /// Config with no whitelisted hosts and default sections
    pub fn new(registry_owner: Address) -> Self {
        Self {
            registry_owner,
            whitelisted: Vec::new(),
            exchange: ExchangeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PartyError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry_owner.is_zero() {
            return Err(PartyError::Config("registry_owner must not be the zero address".into()));
        }
        if self.whitelisted.iter().any(Address::is_zero) {
            return Err(PartyError::Config("cannot whitelist the zero address".into()));
        }
        if self.exchange.default_duration == Some(0) {
            return Err(PartyError::Config("exchange.default_duration must be positive".into()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(PartyError::Config(format!(
                "unknown logging format {:?} (expected \"pretty\" or \"json\")",
                self.logging.format
            )));
        }
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| PartyError::Config(format!("bad logging level {:?}: {e}", self.logging.level)))?;
        Ok(())
    }

    /// Access registry seeded with the configured hosts
    pub fn registry(&self) -> AccessRegistry {
        AccessRegistry::with_hosts(self.registry_owner, self.whitelisted.iter().copied())
    }
}
