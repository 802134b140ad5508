//! Protocol module - Litra wire format.

pub mod command;
pub mod constants;
pub mod report;

pub use command::{CommandBuffer, CommandCode, CommandError, encode, encode_named};
pub use constants::*;
pub use report::{DecodeError, FieldCode, FieldUpdate, check_prefix, decode};
