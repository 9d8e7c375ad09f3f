//! Register reads and float decoding.

use crate::bus::BusSession;
use crate::error::{ReadError, ReadErrorKind};
use crate::registers::{Register, WORDS_PER_MEASUREMENT};

/// Read one measurement from `device` and decode it.
pub async fn read_measurement<S>(
    session: &mut S,
    device: u8,
    register: &Register,
) -> Result<f32, ReadError>
where
    S: BusSession + ?Sized,
{
    session
        .read_input_registers(device, register.address, WORDS_PER_MEASUREMENT)
        .await
        .and_then(|words| decode_f32(&words))
        .map_err(|kind| ReadError::new(device, register, kind))
}

/// Decode two input registers as a big-endian IEEE-754 float.
///
/// The first word holds the most significant half; each word is itself
/// most-significant byte first, as delivered by the Modbus client.
pub fn decode_f32(words: &[u16]) -> Result<f32, ReadErrorKind> {
    let &[high, low] = words else {
        return Err(ReadErrorKind::WordCount(words.len()));
    };

    let value = f32::from_bits((u32::from(high) << 16) | u32::from(low));
    if !value.is_finite() {
        return Err(ReadErrorKind::NonFinite(value));
    }
    Ok(value)
}

/// Split a float into the two big-endian words a meter would return.
pub fn encode_f32(value: f32) -> [u16; 2] {
    let bits = value.to_bits();
    [(bits >> 16) as u16, bits as u16]
}
