//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for USB communication,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Failed to release interface {interface}: {message}")]
    ReleaseFailed { interface: u8, message: String },

    #[error("Interface not claimed")]
    NotClaimed,

    #[error("Endpoint 0x{address:02X} not found on claimed interface")]
    EndpointNotFound { address: u8 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Build the timeout variant for `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Outcome of claiming an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClaimInfo {
    /// A kernel driver was detached and must be reattached on release.
    pub kernel_driver_detached: bool,
}

/// Abstract USB transport interface.
///
/// A transport starts unclaimed. The session claims it once, performs
/// transfers, and releases it exactly once.
pub trait UsbTransport: Send {
    /// Detach any active kernel driver, apply the configuration and claim
    /// `interface`.
    fn claim(&mut self, interface: u8) -> Result<ClaimInfo, TransportError>;

    /// Write raw bytes to `endpoint`.
    fn write(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read up to `max_len` bytes from `endpoint`.
    fn read(&self, endpoint: u8, max_len: usize, timeout: Duration)
    -> Result<Vec<u8>, TransportError>;

    /// Address of the interrupt IN endpoint that carries state reports.
    fn input_endpoint(&self) -> Option<u8>;

    /// Release the interface and reattach a detached kernel driver.
    fn release(&mut self) -> Result<(), TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
