//! The meter's measurement register table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sdm630_common::validate_topic_level;

use crate::config::ConfigError;

/// Every measurement spans two consecutive 16-bit input registers (one f32).
pub const WORDS_PER_MEASUREMENT: u16 = 2;

/// SDM630 input registers, in publishing order (0-based addresses).
const SDM630_REGISTERS: &[(&str, u16)] = &[
    ("L1_Voltage", 0),
    ("L2_Voltage", 2),
    ("L3_Voltage", 4),
    ("L1_Current", 6),
    ("L2_Current", 8),
    ("L3_Current", 10),
    ("L1_Power_Watt", 12),
    ("L2_Power_Watt", 14),
    ("L3_Power_Watt", 16),
    ("L1_Power_VA", 18),
    ("L2_Power_VA", 20),
    ("L3_Power_VA", 22),
    ("L1_Power_VAr", 24),
    ("L2_Power_VAr", 26),
    ("L3_Power_VAr", 28),
    ("Line_to_Neutral_AVG_Volts", 42),
    ("Total_Power_Watt", 52),
    ("Total_Power_VA", 56),
    ("Total_Power_VAr", 60),
    ("Frequency", 70),
    ("Import_Energy_kWh", 72),
    ("Export_Energy_kWh", 74),
    ("Import_Energy_kVArh", 76),
    ("Export_Energy_kVArh", 78),
    ("Total_System_Power_Demand_Max", 86),
    ("Neutral_Current", 224),
    ("L1_Current_THD", 240),
    ("L2_Current_THD", 242),
    ("L3_Current_THD", 244),
    ("Total_Energy_kWh", 342),
    ("Total_Energy_kVArh", 344),
];

/// A named measurement and its starting input register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Measurement name, used as the last topic level.
    pub name: String,

    /// Starting register address (0-based).
    pub address: u16,
}

impl Register {
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Ordered, immutable measurement table shared by every poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    registers: Vec<Register>,
}

impl RegisterMap {
    /// Build a register map, keeping the given order.
    pub fn new(registers: Vec<Register>) -> Result<Self, ConfigError> {
        if registers.is_empty() {
            return Err(ConfigError::Validation(
                "register map cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for register in &registers {
            validate_topic_level(&register.name).map_err(|e| {
                ConfigError::Validation(format!("register name '{}': {}", register.name, e))
            })?;

            if !names.insert(register.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate register name '{}'",
                    register.name
                )));
            }

            if register.address.checked_add(WORDS_PER_MEASUREMENT - 1).is_none() {
                return Err(ConfigError::Validation(format!(
                    "register '{}': address {} leaves no room for {} words",
                    register.name, register.address, WORDS_PER_MEASUREMENT
                )));
            }
        }

        Ok(Self { registers })
    }

    /// The built-in SDM630 measurement table.
    pub fn sdm630() -> Self {
        Self {
            registers: SDM630_REGISTERS
                .iter()
                .map(|&(name, address)| Register::new(name, address))
                .collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Register> {
        self.registers.iter()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a Register;
    type IntoIter = std::slice::Iter<'a, Register>;

    fn into_iter(self) -> Self::IntoIter {
        self.registers.iter()
    }
}
