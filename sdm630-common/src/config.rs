use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// MQTT broker connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or IP address.
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier, reused by every connection of this process.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds (minimum 5).
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// How long to wait for the broker's CONNACK, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Optional username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sdm630-reader".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl MqttConfig {
    /// Create a configuration for `host` with all other fields defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            username: None,
            password: None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the broker settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("MQTT host cannot be empty".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(Error::Config("MQTT client_id cannot be empty".to_string()));
        }
        if self.keep_alive_secs < 5 {
            return Err(Error::Config(format!(
                "MQTT keep_alive_secs must be at least 5 (got {})",
                self.keep_alive_secs
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "MQTT connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.username.is_none() && self.password.is_some() {
            return Err(Error::Config(
                "MQTT password given without a username".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
