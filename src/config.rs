//! Harness configuration
//!
//! Connection parameters have built-in defaults (port 1883, keep-alive 60s).
//! They can be overridden by an optional TOML file and then by command-line
//! flags, in that order.
//!
//! ```toml
//! [mqtt]
//! port = 1883
//! keep_alive_secs = 60
//! connect_timeout_secs = 10
//! client_id = "bench-01"
//! username_env = "MQTT_USER"
//! password_env = "MQTT_PASS"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Default MQTT port
pub const DEFAULT_PORT: u16 = 1883;
/// Default MQTT port for TLS connections
pub const DEFAULT_TLS_PORT: u16 = 8883;
/// Keep-alive interval in seconds
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// MQTT connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttSection {
    /// Broker port used when the broker is given as a bare host
    pub port: u16,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// Time allowed for the broker to acknowledge the connection
    pub connect_timeout_secs: u64,
    /// Fixed client identifier (generated when absent)
    pub client_id: Option<String>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_secs: 10,
            client_id: None,
            username_env: None,
            password_env: None,
        }
    }
}

/// Values given on the command line that take precedence over the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub port: Option<u16>,
    pub keep_alive_secs: Option<u64>,
    pub client_id: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker address: {0}")]
    InvalidBroker(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: HarnessConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides and re-validate
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self, ConfigError> {
        if let Some(port) = overrides.port {
            self.mqtt.port = port;
        }
        if let Some(keep_alive) = overrides.keep_alive_secs {
            self.mqtt.keep_alive_secs = keep_alive;
        }
        if let Some(client_id) = &overrides.client_id {
            self.mqtt.client_id = Some(client_id.clone());
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.port must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(id) = &self.mqtt.client_id {
            if id.is_empty() || id.starts_with(char::is_whitespace) {
                return Err(ConfigError::InvalidConfig(format!(
                    "client id '{id}' must be non-empty and not start with whitespace"
                )));
            }
        }
        Ok(())
    }
}

impl MqttSection {
    /// Username read from the configured environment variable
    pub fn username(&self) -> Option<String> {
        self.username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Password read from the configured environment variable, empty when unset
    pub fn password(&self) -> String {
        self.password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default()
    }
}

/// Resolved broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    /// Parse a broker argument.
    ///
    /// A bare host uses `default_port`. `mqtt://` and `mqtts://` URLs carry
    /// their own port, falling back to 1883 and 8883 respectively.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidBroker("broker must not be empty".to_string()));
        }

        if !trimmed.contains("://") {
            return Ok(Self {
                host: trimmed.to_string(),
                port: default_port,
                tls: false,
            });
        }

        let url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidBroker(input.to_string()))?;
        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            other => {
                return Err(ConfigError::InvalidBroker(format!(
                    "unsupported scheme '{other}' in {input}"
                )))
            }
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidBroker(input.to_string()))?;
        let port = url
            .port()
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            tls,
        })
    }
}
