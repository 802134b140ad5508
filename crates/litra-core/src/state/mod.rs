//! State module.

pub mod device;
pub mod machine;

pub use device::{DeviceState, StateError};
pub use machine::{PhaseTracker, SessionPhase};
