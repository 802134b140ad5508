//! Event system for UI decoupling.
//!
//! Allows CLI/TUI to subscribe to session events without
//! tight coupling to the core logic.

use std::fmt;

use crate::protocol::{CommandCode, DecodeError, FieldUpdate};
use crate::state::{DeviceState, SessionPhase};

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Why an inbound report was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The buffer did not decode.
    Decode(DecodeError),
    /// It decoded, but the value was refused by the device state.
    Rejected(FieldUpdate),
}

impl SkipReason {
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self {
            SkipReason::Decode(e) => Some(e),
            SkipReason::Rejected(_) => None,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Decode(e) => write!(f, "{}", e),
            SkipReason::Rejected(update) => write!(f, "out-of-range {}", update),
        }
    }
}

/// Events emitted by a Litra session.
#[derive(Debug, Clone)]
pub enum LitraEvent {
    /// Interface claimed.
    DeviceClaimed {
        product: &'static str,
        vid: u16,
        pid: u16,
        kernel_driver_detached: bool,
    },
    /// Transport released.
    DeviceReleased,
    /// Device went away during polling.
    DeviceDisconnected,
    /// Phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// Command written and acknowledged.
    CommandSent { command: CommandCode, value: u64 },
    /// A local value was refused before reaching the device.
    ValueRejected { command: CommandCode, value: u64 },
    /// Device state changed, from a report or an acknowledged command.
    StateChanged { update: FieldUpdate, state: DeviceState },
    /// A report was skipped.
    ReportSkipped { reason: SkipReason, data: Vec<u8> },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// USB Packet sent/received.
    Packet {
        direction: PacketDirection,
        endpoint: u8,
        length: usize,
        data: Option<Vec<u8>>,
    },
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait LitraObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &LitraEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl LitraObserver for NullObserver {
    fn on_event(&self, _event: &LitraEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl LitraObserver for TracingObserver {
    fn on_event(&self, event: &LitraEvent) {
        match event {
            LitraEvent::DeviceClaimed {
                product,
                vid,
                pid,
                kernel_driver_detached,
            } => {
                tracing::info!(
                    product = %product,
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    kernel_driver_detached,
                    "Device claimed"
                );
            }
            LitraEvent::DeviceReleased => {
                tracing::info!("Device released");
            }
            LitraEvent::DeviceDisconnected => {
                tracing::warn!("Device disconnected");
            }
            LitraEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            LitraEvent::CommandSent { command, value } => {
                tracing::info!(command = %command, value, "Command sent");
            }
            LitraEvent::ValueRejected { command, value } => {
                tracing::debug!(command = %command, value, "Value rejected locally");
            }
            LitraEvent::StateChanged { update, state } => {
                tracing::info!(update = %update, "{}", state);
            }
            LitraEvent::ReportSkipped { reason, data } => {
                tracing::warn!(
                    reason = %reason,
                    data = %format!("{:02X?}", &data[..data.len().min(8)]),
                    "Skipped report"
                );
            }
            LitraEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            LitraEvent::Packet {
                direction,
                endpoint,
                length,
                ..
            } => {
                tracing::trace!(
                    dir = %direction,
                    endpoint = %format!("0x{:02X}", endpoint),
                    len = length,
                    "USB Packet"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every event for later inspection.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<LitraEvent>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<LitraEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, pred: impl Fn(&LitraEvent) -> bool) -> usize {
            self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
        }
    }

    impl LitraObserver for RecordingObserver {
        fn on_event(&self, event: &LitraEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
