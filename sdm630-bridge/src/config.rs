//! Configuration for the SDM630 bridge.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use sdm630_common::{LoggingConfig, MqttConfig, PayloadFormat, TOPIC_PREFIX, validate_prefix};

use crate::registers::{Register, RegisterMap};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sdm630_common::Error> for ConfigError {
    fn from(e: sdm630_common::Error) -> Self {
        ConfigError::Validation(e.to_string())
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// MQTT broker settings
    pub mqtt: MqttConfig,

    /// Meter bus settings
    pub meter: MeterConfig,

    /// Poll schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Meters sharing one serial line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Topic prefix (default: "power/sdm630/")
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Modbus unit ids of the meters, polled in this order
    pub devices: Vec<u8>,

    /// Serial line settings
    pub connection: SerialConfig,

    /// Per-request response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Payload encoding of published values
    #[serde(default)]
    pub payload: PayloadFormat,

    /// Measurement table; the built-in SDM630 table when omitted
    #[serde(default)]
    pub registers: Option<Vec<Register>>,
}

fn default_topic_prefix() -> String {
    TOPIC_PREFIX.to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Modbus RTU serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
    pub port: String,
    /// Baud rate (default: 38400)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    38400
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl SerialConfig {
    /// Settings for `port` with the meter's default line parameters (38400 8N1).
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

/// When poll cycles fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds past each minute at which a cycle starts
    #[serde(default = "default_seconds")]
    pub seconds: Vec<u32>,

    /// How late a tick may be dispatched before it is skipped, in milliseconds
    #[serde(default = "default_misfire_grace_ms")]
    pub misfire_grace_ms: u64,
}

fn default_seconds() -> Vec<u32> {
    vec![0, 30]
}

fn default_misfire_grace_ms() -> u64 {
    1000
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            seconds: default_seconds(),
            misfire_grace_ms: default_misfire_grace_ms(),
        }
    }
}

impl ScheduleConfig {
    pub fn misfire_grace(&self) -> Duration {
        Duration::from_millis(self.misfire_grace_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mqtt.validate()?;
        validate_prefix(&self.meter.topic_prefix)?;

        if self.meter.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for &device in &self.meter.devices {
            if !(1..=247).contains(&device) {
                return Err(ConfigError::Validation(format!(
                    "Device address {} out of range (use 1-247)",
                    device
                )));
            }
            if !seen.insert(device) {
                return Err(ConfigError::Validation(format!(
                    "Device address {} listed twice",
                    device
                )));
            }
        }

        if self.meter.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        let serial = &self.meter.connection;
        if serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }
        match serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Invalid parity '{}' (use none, even, or odd)",
                    serial.parity
                )));
            }
        }
        if !(5..=8).contains(&serial.data_bits) {
            return Err(ConfigError::Validation(format!(
                "Invalid data_bits {} (use 5-8)",
                serial.data_bits
            )));
        }
        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "Invalid stop_bits {} (use 1 or 2)",
                serial.stop_bits
            )));
        }

        if self.schedule.seconds.is_empty() {
            return Err(ConfigError::Validation(
                "Schedule needs at least one second offset".to_string(),
            ));
        }
        if let Some(second) = self.schedule.seconds.iter().find(|s| **s >= 60) {
            return Err(ConfigError::Validation(format!(
                "Schedule second {} out of range (use 0-59)",
                second
            )));
        }

        self.meter.register_map()?;

        Ok(())
    }
}

impl MeterConfig {
    /// Build the register map for this meter.
    pub fn register_map(&self) -> Result<RegisterMap, ConfigError> {
        match &self.registers {
            Some(registers) => RegisterMap::new(registers.clone()),
            None => Ok(RegisterMap::sdm630()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"{
            mqtt: { host: "192.168.66.2" },
            meter: {
                devices: [1, 2],
                connection: { port: "/dev/ttyUSB0" }
            }
        }"#
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.meter.devices, vec![1, 2]);
        assert_eq!(config.meter.topic_prefix, "power/sdm630/");
        assert_eq!(config.meter.connection, SerialConfig::new("/dev/ttyUSB0"));
        assert_eq!(config.meter.connection.baud_rate, 38400);
        assert_eq!(config.meter.payload, PayloadFormat::Plain);
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.schedule.seconds, vec![0, 30]);
        assert_eq!(config.schedule.misfire_grace(), Duration::from_secs(1));
        assert_eq!(config.meter.register_map().unwrap(), RegisterMap::sdm630());
    }

    #[test]
    fn test_parse_custom_registers() {
        let json = r#"{
            mqtt: { host: "broker", client_id: "garage-meter" },
            meter: {
                topic_prefix: "garage/",
                devices: [3],
                connection: { port: "/dev/ttyAMA0", baud_rate: 9600, parity: "even" },
                payload: "json",
                registers: [
                    { name: "Frequency", address: 70 },
                    { name: "L1_Voltage", address: 0 }
                ]
            },
            schedule: { seconds: [15], misfire_grace_ms: 500 }
        }"#;

        let config: BridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        let map = config.meter.register_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().next().map(|r| r.name.as_str()), Some("Frequency"));
        assert_eq!(config.meter.payload, PayloadFormat::Json);
        assert_eq!(config.schedule.seconds, vec![15]);
    }

    #[test]
    fn test_validate_empty_devices() {
        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.meter.devices.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_device_range() {
        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.meter.devices = vec![0];
        assert!(config.validate().is_err());

        config.meter.devices = vec![248];
        assert!(config.validate().is_err());

        config.meter.devices = vec![1, 1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_schedule() {
        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.schedule.seconds = vec![60];
        assert!(config.validate().is_err());

        config.schedule.seconds.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_serial_line() {
        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.meter.connection.parity = "mark".to_string();
        assert!(config.validate().is_err());

        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.meter.connection.stop_bits = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_wildcard_prefix() {
        let mut config: BridgeConfig = json5::from_str(minimal()).unwrap();
        config.meter.topic_prefix = "power/#/".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BridgeConfig::load_from_file("/nonexistent/sdm630.json5");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
