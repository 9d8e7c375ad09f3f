//! SDM630 bridge common library
//!
//! Shared types and utilities for the SDM630 → MQTT bridge:
//!
//! - [`config`] - MQTT and logging settings
//! - [`session`] - MQTT broker sessions
//! - [`topic`] - Measurement topic builders and validation
//! - [`measurement`] - Measurement payload encoding
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod measurement;
pub mod session;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig};
pub use error::{Error, Result};
pub use measurement::{Measurement, PayloadFormat, current_timestamp_millis, encode_payload};
pub use session::{MqttSession, connect};
pub use topic::{TOPIC_PREFIX, TopicBuilder, validate_prefix, validate_topic_level};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
