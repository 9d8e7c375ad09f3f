//! Error types for a poll cycle.

use std::time::Duration;

use thiserror::Error;

use crate::registers::Register;

/// Failure to open one of the cycle's connections. Aborts the whole cycle.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("MQTT broker connection failed: {0}")]
    Broker(String),
    #[error("Serial bus connection failed: {0}")]
    Bus(String),
}

/// What went wrong while reading a single register.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReadErrorKind {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("device exception: {0}")]
    Exception(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("expected 2 words, got {0}")]
    WordCount(usize),
    #[error("decoded value {0} is not finite")]
    NonFinite(f32),
}

/// Failure to read or decode one (device, register) pair.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("device {device}: reading {register} @ {address} failed: {kind}")]
pub struct ReadError {
    pub device: u8,
    pub register: String,
    pub address: u16,
    #[source]
    pub kind: ReadErrorKind,
}

impl ReadError {
    pub fn new(device: u8, register: &Register, kind: ReadErrorKind) -> Self {
        Self {
            device,
            register: register.name.clone(),
            address: register.address,
            kind,
        }
    }
}

/// Local failure while handing a measurement to the MQTT client.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("publishing to '{topic}' failed: {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

/// Outcome of a failed read-and-publish step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ItemError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}
