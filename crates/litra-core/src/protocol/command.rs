//! Outbound command buffers.
//!
//! Every command is a fixed 20-byte buffer:
//!
//! ```text
//! [0x11, 0xFF, 0x04, <code>, <value, big-endian, minimal>, 0x00 ...]
//! ```

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),
    #[error("Value 0x{value:X} needs {needed} bytes, only {available} available")]
    ValueTooLarge {
        value: u64,
        needed: usize,
        available: usize,
    },
}

/// Command codes understood by Litra lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    PowerGet = CMD_POWER_GET,
    Power = CMD_POWER,
    Brightness = CMD_BRIGHTNESS,
    Temperature = CMD_TEMPERATURE,
}

impl CommandCode {
    pub const ALL: [CommandCode; 4] = [
        CommandCode::PowerGet,
        CommandCode::Power,
        CommandCode::Brightness,
        CommandCode::Temperature,
    ];

    /// Wire byte for this command.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Symbolic name, as accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            CommandCode::PowerGet => "power_get",
            CommandCode::Power => "power",
            CommandCode::Brightness => "brightness",
            CommandCode::Temperature => "temperature",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandCode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandCode::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| CommandError::InvalidCommand(s.to_string()))
    }
}

/// A ready-to-send 20-byte command.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandBuffer([u8; COMMAND_BUFFER_LEN]);

impl CommandBuffer {
    pub const LEN: usize = COMMAND_BUFFER_LEN;

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The command code byte (offset 3).
    pub fn code(&self) -> u8 {
        self.0[BUFFER_PREFIX.len()]
    }
}

impl AsRef<[u8]> for CommandBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandBuffer({:02X?})", self.0)
    }
}

/// Minimal big-endian bytes of `value`. Zero still takes one byte so a
/// zero value is never confused with "no value".
fn value_bytes(value: u64) -> Vec<u8> {
    let mut be = Vec::with_capacity(8);
    // Writing into a Vec cannot fail.
    let _ = be.write_u64::<BigEndian>(value);
    let start = be
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(be.len() - 1);
    be.split_off(start)
}

/// Build the command buffer for `command` carrying `value`.
pub fn encode(command: CommandCode, value: u64) -> Result<CommandBuffer, CommandError> {
    let bytes = value_bytes(value);
    if bytes.len() > MAX_VALUE_LEN {
        return Err(CommandError::ValueTooLarge {
            value,
            needed: bytes.len(),
            available: MAX_VALUE_LEN,
        });
    }

    let mut buf = [0u8; COMMAND_BUFFER_LEN];
    buf[..BUFFER_PREFIX.len()].copy_from_slice(&BUFFER_PREFIX);
    buf[BUFFER_PREFIX.len()] = command.code();
    buf[COMMAND_HEADER_LEN..COMMAND_HEADER_LEN + bytes.len()].copy_from_slice(&bytes);
    Ok(CommandBuffer(buf))
}

/// Like [`encode`], looking the command up by its symbolic name.
pub fn encode_named(name: &str, value: u64) -> Result<CommandBuffer, CommandError> {
    encode(name.parse()?, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_layout() {
        let buf = encode(CommandCode::Power, 1).unwrap();
        let mut expected = vec![0x11, 0xFF, 0x04, 0x1C, 0x01];
        expected.resize(20, 0);
        assert_eq!(buf.as_bytes(), expected.as_slice());
        assert_eq!(buf.as_bytes()[5..].iter().filter(|&&b| b == 0).count(), 15);
    }

    #[test]
    fn test_every_command_has_prefix_and_code() {
        for (command, value) in [
            (CommandCode::PowerGet, 0),
            (CommandCode::Power, 0),
            (CommandCode::Power, 1),
            (CommandCode::Brightness, 0x14),
            (CommandCode::Brightness, 0xFA),
            (CommandCode::Temperature, 2700),
            (CommandCode::Temperature, 6500),
        ] {
            let buf = encode(command, value).unwrap();
            assert_eq!(buf.as_bytes().len(), CommandBuffer::LEN);
            assert_eq!(&buf.as_bytes()[..3], &BUFFER_PREFIX);
            assert_eq!(buf.code(), command.code());
        }
    }

    #[test]
    fn test_value_zero_takes_one_byte() {
        let buf = encode(CommandCode::Power, 0).unwrap();
        assert_eq!(&buf.as_bytes()[..5], &[0x11, 0xFF, 0x04, 0x1C, 0x00]);
        assert_eq!(value_bytes(0), vec![0x00]);
    }

    #[test]
    fn test_temperature_is_big_endian() {
        // 6500 = 0x1964
        let buf = encode(CommandCode::Temperature, 6500).unwrap();
        assert_eq!(&buf.as_bytes()[3..7], &[0x9C, 0x19, 0x64, 0x00]);
    }

    #[test]
    fn test_largest_value_fits() {
        let buf = encode(CommandCode::Brightness, u64::MAX).unwrap();
        assert_eq!(&buf.as_bytes()[4..12], &[0xFF; 8]);
        assert_eq!(&buf.as_bytes()[12..], &[0x00; 8]);
    }

    #[test]
    fn test_encode_named() {
        let named = encode_named("brightness", 0xFA).unwrap();
        assert_eq!(named, encode(CommandCode::Brightness, 0xFA).unwrap());

        let err = encode_named("strobe", 1).unwrap_err();
        assert_eq!(err, CommandError::InvalidCommand("strobe".into()));
    }

    #[test]
    fn test_command_names_roundtrip() {
        for command in CommandCode::ALL {
            assert_eq!(command.name().parse::<CommandCode>().unwrap(), command);
        }
    }
}
