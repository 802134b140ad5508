//! Litra-Core: control for Logitech Litra Glow and Litra Beam lights.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command encoding and report decoding
//! - **Catalog**: Supported products and their USB parameters
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **State**: Validated device state and session phases
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Claims a device, sends commands, polls reports
//! - **Device**: Discovery of attached lights
//!
//! # Example
//!
//! ```no_run
//! use litra_core::device;
//! use litra_core::session::{LitraSession, SessionConfig};
//!
//! for found in device::discover()? {
//!     let session = LitraSession::new(found.open()?, SessionConfig::default())?;
//!     session.turn_on()?;
//!     session.set_brightness(120)?;
//!     session.set_color_temperature(4500)?;
//!     session.close()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod device;
pub mod events;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use catalog::{CatalogError, ProductDescriptor};
pub use device::{DeviceFilter, DiscoveredDevice};
pub use events::{LitraEvent, LitraObserver, LogLevel, NullObserver, TracingObserver};
pub use protocol::{CommandCode, FieldUpdate};
pub use session::{CancelToken, LitraSession, SessionConfig, SessionError};
pub use state::{DeviceState, SessionPhase, StateError};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
