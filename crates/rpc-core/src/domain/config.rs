//! Request handler configuration with validation.
//!
//! Loaded from TOML, durations in humantime notation (`"10s"`, `"250ms"`),
//! then overridden from the environment.

use crate::domain::envelope::QoS;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `transport.address`.
pub const ENV_TRANSPORT_ADDRESS: &str = "RPC_TRANSPORT_ADDRESS";
/// Environment variable overriding `transport.username`.
pub const ENV_USERNAME: &str = "RPC_USERNAME";
/// Environment variable overriding `transport.password`.
pub const ENV_PASSWORD: &str = "RPC_PASSWORD";
/// Environment variable overriding `transport.client_id`.
pub const ENV_CLIENT_ID: &str = "RPC_CLIENT_ID";
/// Environment variable overriding `requests.timeout`.
pub const ENV_REQUEST_TIMEOUT: &str = "RPC_REQUEST_TIMEOUT";

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Transport connection settings
    pub transport: TransportConfig,
    /// Request handling settings
    pub requests: RequestConfig,
}

/// Transport connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Broker address
    pub address: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    /// Client id; a random UUID is used when absent
    pub client_id: Option<String>,
    /// Keep-alive interval
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: "memory://local".to_string(),
            username: None,
            password: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Request handling settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Default timeout applied to every request unless overridden per call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// How often the registry is swept for abandoned entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// How long past its deadline an entry may linger before the sweeper
    /// removes it
    #[serde(with = "humantime_serde")]
    pub sweep_grace: Duration,
    /// QoS level for the reply topic subscription (0, 1 or 2)
    pub reply_qos: u8,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            sweep_grace: Duration::from_secs(5),
            reply_qos: 1,
        }
    }
}

impl RequestConfig {
    /// Reply subscription QoS. Falls back to at-least-once for an invalid
    /// level; `validate` rejects those up front.
    pub fn reply_qos(&self) -> QoS {
        QoS::from_level(self.reply_qos).unwrap_or(QoS::AtLeastOnce)
    }

    /// Validate request settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep interval cannot be 0".into(),
            ));
        }

        if QoS::from_level(self.reply_qos).is_none() {
            return Err(ConfigError::InvalidQos(self.reply_qos));
        }

        Ok(())
    }
}

impl RpcConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a TOML file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_TRANSPORT_ADDRESS) {
            self.transport.address = address;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.transport.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.transport.password = Some(SecretString::from(password));
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.transport.client_id = Some(client_id);
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            self.requests.timeout = humantime::parse_duration(&timeout).map_err(|e| {
                ConfigError::InvalidTimeout(format!("{ENV_REQUEST_TIMEOUT}={timeout}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }

        self.requests.validate()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(String),
    /// Config file is not valid TOML or has wrong types
    #[error("invalid config: {0}")]
    Parse(String),
    /// Transport address is empty
    #[error("transport address is required")]
    MissingAddress,
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// QoS level outside 0..=2
    #[error("invalid reply qos: {0}")]
    InvalidQos(u8),
}
