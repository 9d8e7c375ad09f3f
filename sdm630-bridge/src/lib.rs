//! SDM630 energy meter bridge.
//!
//! Polls SDM630 meters sharing one Modbus RTU serial line and publishes every
//! measurement to MQTT.
//!
//! # Topics
//!
//! ```text
//! <prefix><device>/<measurement>
//! ```
//!
//! Where:
//! - `<prefix>` - Topic prefix from configuration (default `power/sdm630/`)
//! - `<device>` - Modbus unit id of the meter
//! - `<measurement>` - Measurement name from the register map
//!
//! Each cycle opens the MQTT connection, then the serial port, reads every
//! register of every meter in order, and closes both again.

pub mod broker;
pub mod bus;
pub mod config;
pub mod cycle;
pub mod error;
pub mod publisher;
pub mod reader;
pub mod registers;
pub mod scheduler;
