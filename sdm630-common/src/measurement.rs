use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single decoded meter reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Unix epoch milliseconds when the value was read.
    pub timestamp: i64,

    /// Bus address of the meter.
    pub device: u8,

    /// Measurement name from the register map (e.g., "L1_Voltage").
    pub measurement: String,

    /// The decoded value.
    pub value: f64,
}

impl Measurement {
    /// Create a measurement stamped with the current time.
    pub fn new(device: u8, measurement: impl Into<String>, value: f32) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            device,
            measurement: measurement.into(),
            value: f64::from(value),
        }
    }
}

/// Wire format of published payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Bare decimal text of the value, e.g. `1234.5`.
    #[default]
    Plain,

    /// JSON object carrying timestamp, device, measurement and value.
    Json,
}

/// Encode a measurement into a message payload.
pub fn encode_payload(
    device: u8,
    measurement: &str,
    value: f32,
    format: PayloadFormat,
) -> Result<Vec<u8>> {
    match format {
        // f32's Display gives the shortest text that parses back to the same value.
        PayloadFormat::Plain => Ok(value.to_string().into_bytes()),
        PayloadFormat::Json => {
            let point = Measurement::new(device, measurement, value);
            Ok(serde_json::to_vec(&point)?)
        }
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_payload() {
        let payload = encode_payload(1, "Total_Power_Watt", 1234.5, PayloadFormat::Plain).unwrap();
        assert_eq!(payload, b"1234.5");

        let payload = encode_payload(1, "L1_Voltage", 230.0, PayloadFormat::Plain).unwrap();
        assert_eq!(payload, b"230");
    }

    #[test]
    fn test_plain_payload_parses_back() {
        let value = 1234.5703f32;
        let payload = encode_payload(1, "L1_Power_Watt", value, PayloadFormat::Plain).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert_eq!(text.parse::<f32>().unwrap(), value);
    }

    #[test]
    fn test_plain_payload_is_shorter_than_widened_text() {
        let value = 230.1f32;
        let payload = encode_payload(1, "L1_Voltage", value, PayloadFormat::Plain).unwrap();
        assert_eq!(payload, b"230.1");

        let widened = f64::from(value).to_string();
        assert_eq!(widened, "230.10000610351562");
        assert_eq!(widened.parse::<f64>().unwrap() as f32, value);
    }

    #[test]
    fn test_json_payload() {
        let payload = encode_payload(2, "Frequency", 50.0, PayloadFormat::Json).unwrap();
        let decoded: Measurement = serde_json::from_slice(&payload).unwrap();

        assert_eq!(decoded.device, 2);
        assert_eq!(decoded.measurement, "Frequency");
        assert_eq!(decoded.value, 50.0);
        assert!(decoded.timestamp > 0);
    }

    #[test]
    fn test_format_default() {
        assert_eq!(PayloadFormat::default(), PayloadFormat::Plain);
    }
}
