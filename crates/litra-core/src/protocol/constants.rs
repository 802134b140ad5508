/// Leading bytes of every command and report.
pub const BUFFER_PREFIX: [u8; 3] = [0x11, 0xFF, 0x04];

/// Outbound command buffers are always this long.
pub const COMMAND_BUFFER_LEN: usize = 20;

/// Prefix plus the command code byte.
pub const COMMAND_HEADER_LEN: usize = BUFFER_PREFIX.len() + 1;

/// Room left for the encoded value.
pub const MAX_VALUE_LEN: usize = COMMAND_BUFFER_LEN - COMMAND_HEADER_LEN;

/// Offset of the field code inside a report.
pub const FIELD_CODE_OFFSET: usize = 3;

/// Offset of the field payload inside a report.
pub const PAYLOAD_OFFSET: usize = 4;

// Command codes
pub const CMD_POWER_GET: u8 = 0x1B;
pub const CMD_POWER: u8 = 0x1C;
pub const CMD_BRIGHTNESS: u8 = 0x4C;
pub const CMD_TEMPERATURE: u8 = 0x9C;

// Report field codes
pub const FIELD_POWER: u8 = 0;
pub const FIELD_BRIGHTNESS: u8 = 16;
pub const FIELD_TEMPERATURE: u8 = 32;

pub const LIGHT_OFF: u8 = 0x00;
pub const LIGHT_ON: u8 = 0x01;

pub const MIN_BRIGHTNESS: u16 = 0x14;
pub const MAX_BRIGHTNESS: u16 = 0xFA;
pub const MIN_TEMPERATURE: u16 = 2700;
pub const MAX_TEMPERATURE: u16 = 6500;

/// Timeout for command writes and their acknowledgements.
pub const COMMAND_TIMEOUT_MS: u64 = 3000;

/// Timeout for a single poll of the interrupt IN endpoint.
pub const POLL_TIMEOUT_MS: u64 = 100;

/// Direction bit of an IN endpoint address.
pub const ENDPOINT_DIR_IN: u8 = 0x80;
