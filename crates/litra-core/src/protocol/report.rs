//! Inbound report decoding.
//!
//! Litra lights emit a report whenever a physical button changes the power,
//! brightness or color temperature. Reports share the command prefix; byte 3
//! names the field and the payload starts at byte 4. Decoding is pure and
//! never touches device state.

use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed report ({len} bytes): {reason}")]
    MalformedReport { len: usize, reason: &'static str },
    #[error("Unknown field code {0} (0x{0:02X})")]
    UnknownField(u8),
    #[error("Invalid power value 0x{0:02X} (expected 0 or 1)")]
    InvalidPowerValue(u8),
    #[error("Truncated {field} payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload {
        field: FieldCode,
        expected: usize,
        actual: usize,
    },
}

/// Attribute a report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldCode {
    Power = FIELD_POWER,
    Brightness = FIELD_BRIGHTNESS,
    Temperature = FIELD_TEMPERATURE,
}

impl FieldCode {
    pub fn from_byte(code: u8) -> Option<Self> {
        match code {
            FIELD_POWER => Some(FieldCode::Power),
            FIELD_BRIGHTNESS => Some(FieldCode::Brightness),
            FIELD_TEMPERATURE => Some(FieldCode::Temperature),
            _ => None,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Number of payload bytes the field's validator consumes.
    pub const fn payload_len(self) -> usize {
        match self {
            FieldCode::Power => 1,
            FieldCode::Brightness | FieldCode::Temperature => 2,
        }
    }
}

impl fmt::Display for FieldCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCode::Power => write!(f, "power"),
            FieldCode::Brightness => write!(f, "brightness"),
            FieldCode::Temperature => write!(f, "temperature"),
        }
    }
}

/// A decoded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Power(bool),
    Brightness(u16),
    Temperature(u16),
}

impl FieldUpdate {
    pub fn field(&self) -> FieldCode {
        match self {
            FieldUpdate::Power(_) => FieldCode::Power,
            FieldUpdate::Brightness(_) => FieldCode::Brightness,
            FieldUpdate::Temperature(_) => FieldCode::Temperature,
        }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldUpdate::Power(on) => write!(f, "power={}", if *on { "on" } else { "off" }),
            FieldUpdate::Brightness(v) => write!(f, "brightness={}", v),
            FieldUpdate::Temperature(v) => write!(f, "temperature={}K", v),
        }
    }
}

/// Check the prefix shared by reports and acknowledgements.
pub fn check_prefix(buffer: &[u8]) -> Result<(), DecodeError> {
    if buffer.len() < PAYLOAD_OFFSET {
        return Err(DecodeError::MalformedReport {
            len: buffer.len(),
            reason: "shorter than header",
        });
    }
    if buffer[..BUFFER_PREFIX.len()] != BUFFER_PREFIX {
        return Err(DecodeError::MalformedReport {
            len: buffer.len(),
            reason: "bad prefix",
        });
    }
    Ok(())
}

/// Decode a report into the update it announces.
pub fn decode(buffer: &[u8]) -> Result<FieldUpdate, DecodeError> {
    check_prefix(buffer)?;

    let code = buffer[FIELD_CODE_OFFSET];
    let field = FieldCode::from_byte(code).ok_or(DecodeError::UnknownField(code))?;
    let payload = &buffer[PAYLOAD_OFFSET..];

    if payload.len() < field.payload_len() {
        return Err(DecodeError::TruncatedPayload {
            field,
            expected: field.payload_len(),
            actual: payload.len(),
        });
    }

    match field {
        FieldCode::Power => validate_power(payload).map(FieldUpdate::Power),
        FieldCode::Brightness => Ok(FieldUpdate::Brightness(read_be_u16(payload))),
        FieldCode::Temperature => Ok(FieldUpdate::Temperature(read_be_u16(payload))),
    }
}

fn validate_power(payload: &[u8]) -> Result<bool, DecodeError> {
    match payload[0] {
        LIGHT_OFF => Ok(false),
        LIGHT_ON => Ok(true),
        other => Err(DecodeError::InvalidPowerValue(other)),
    }
}

// Callers have already checked the payload holds two bytes.
fn read_be_u16(payload: &[u8]) -> u16 {
    Cursor::new(payload).read_u16::<BigEndian>().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(field: u8, payload: &[u8], len: usize) -> Vec<u8> {
        let mut buf = BUFFER_PREFIX.to_vec();
        buf.push(field);
        buf.extend_from_slice(payload);
        buf.resize(len.max(buf.len()), 0);
        buf
    }

    #[test]
    fn test_brightness_report() {
        let buf = report(16, &[0x00, 0xFA], 64);
        assert_eq!(decode(&buf).unwrap(), FieldUpdate::Brightness(250));
    }

    #[test]
    fn test_temperature_report() {
        let buf = report(32, &[0x0A, 0x8C], 32);
        assert_eq!(decode(&buf).unwrap(), FieldUpdate::Temperature(2700));
    }

    #[test]
    fn test_power_reports() {
        assert_eq!(decode(&report(0, &[1], 64)).unwrap(), FieldUpdate::Power(true));
        assert_eq!(decode(&report(0, &[0], 64)).unwrap(), FieldUpdate::Power(false));
        assert_eq!(
            decode(&report(0, &[2], 64)).unwrap_err(),
            DecodeError::InvalidPowerValue(2)
        );
    }

    #[test]
    fn test_decoded_field_matches_code() {
        for (code, payload) in [(0u8, [1u8, 0]), (16, [0, 20]), (32, [0x19, 0x64])] {
            let update = decode(&report(code, &payload, 20)).unwrap();
            assert_eq!(update.field().code(), code);
        }
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        for len in 0..4 {
            let buf = &[0x11, 0xFF, 0x04, 0x10][..len];
            assert!(matches!(
                decode(buf),
                Err(DecodeError::MalformedReport { .. })
            ));
        }
    }

    #[test]
    fn test_wrong_prefix_is_malformed() {
        let mut buf = report(16, &[0x00, 0xFA], 64);
        buf[2] = 0x05;
        assert!(matches!(
            decode(&buf),
            Err(DecodeError::MalformedReport { reason: "bad prefix", .. })
        ));
    }

    #[test]
    fn test_unknown_field() {
        let buf = report(0x1C, &[0x01], 64);
        assert_eq!(decode(&buf).unwrap_err(), DecodeError::UnknownField(0x1C));
    }

    #[test]
    fn test_truncated_payload() {
        let buf = report(32, &[0x19], 0);
        assert_eq!(
            decode(&buf).unwrap_err(),
            DecodeError::TruncatedPayload {
                field: FieldCode::Temperature,
                expected: 2,
                actual: 1,
            }
        );
        assert!(decode(&report(0, &[], 0)).is_err());
    }
}
