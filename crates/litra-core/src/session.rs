//! Litra Session - binds a transport to a product and drives it.
//!
//! A session claims the transport when it is created and releases it exactly
//! once: on [`LitraSession::close`], or when the session is dropped.
//! Commands and the report loop may run on different threads; transfers are
//! serialized through the transport lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{self, CatalogError, ProductDescriptor};
use crate::events::{LitraEvent, LitraObserver, PacketDirection, SkipReason, TracingObserver};
use crate::protocol::{
    self, COMMAND_TIMEOUT_MS, CommandCode, CommandError, ENDPOINT_DIR_IN, FieldUpdate,
    LIGHT_OFF, LIGHT_ON, PAYLOAD_OFFSET, POLL_TIMEOUT_MS,
};
use crate::state::device::{brightness_in_range, check_temperature};
use crate::state::{DeviceState, PhaseTracker, SessionPhase, StateError};
use crate::transport::{TransportError, UsbTransport};

/// Configuration for a Litra session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB interface to claim.
    pub interface: u8,
    /// Timeout for command writes and acknowledgements.
    pub command_timeout_ms: u64,
    /// Timeout for a single report poll.
    pub poll_timeout_ms: u64,
    /// Read the device's acknowledgement after each command.
    pub read_acknowledgement: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: 0,
            command_timeout_ms: COMMAND_TIMEOUT_MS,
            poll_timeout_ms: POLL_TIMEOUT_MS,
            read_acknowledgement: true,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Device validation failed: {0}")]
    Validation(#[from] CatalogError),

    #[error("Failed to claim device: {0}")]
    Claim(#[source] TransportError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InvalidValue(#[from] StateError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Device has no interrupt IN endpoint for reports")]
    NoInputEndpoint,

    #[error("Session is closed")]
    Closed,
}

/// Cooperative stop signal for [`LitraSession::run_report_loop`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A claimed Litra light.
pub struct LitraSession<T: UsbTransport, O: LitraObserver = TracingObserver> {
    product: &'static ProductDescriptor,
    config: SessionConfig,
    transport: Mutex<T>,
    state: Mutex<DeviceState>,
    phase: Mutex<PhaseTracker>,
    observer: Arc<O>,
}

impl<T: UsbTransport> LitraSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: UsbTransport, O: LitraObserver> LitraSession<T, O> {
    /// Validate the device and claim its interface.
    ///
    /// On failure the transport has already been released.
    #[instrument(skip_all, fields(vid = %format!("{:04X}", transport.vendor_id()), pid = %format!("{:04X}", transport.product_id())))]
    pub fn with_observer(
        mut transport: T,
        config: SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self, SessionError> {
        let product = match catalog::lookup(transport.vendor_id(), transport.product_id()) {
            Ok(p) => p,
            Err(e) => {
                release_after_failure(&mut transport);
                return Err(e.into());
            }
        };

        let claim = match transport.claim(config.interface) {
            Ok(c) => c,
            Err(e) => {
                release_after_failure(&mut transport);
                return Err(SessionError::Claim(e));
            }
        };

        let mut phase = PhaseTracker::new();
        phase.goto(SessionPhase::Claimed);

        observer.on_event(&LitraEvent::DeviceClaimed {
            product: product.display_name,
            vid: transport.vendor_id(),
            pid: transport.product_id(),
            kernel_driver_detached: claim.kernel_driver_detached,
        });
        observer.on_event(&LitraEvent::PhaseChanged {
            from: SessionPhase::Uninitialized,
            to: SessionPhase::Claimed,
        });

        Ok(Self {
            product,
            config,
            transport: Mutex::new(transport),
            state: Mutex::new(DeviceState::new()),
            phase: Mutex::new(phase),
            observer,
        })
    }

    pub fn product(&self) -> &'static ProductDescriptor {
        self.product
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the last known device state.
    pub fn state(&self) -> DeviceState {
        *lock(&self.state)
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.phase).phase()
    }

    fn emit(&self, event: LitraEvent) {
        self.observer.on_event(&event);
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.phase().is_open() {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    fn mark_active(&self) {
        let prev = lock(&self.phase).goto(SessionPhase::Active);
        if prev == Some(SessionPhase::Claimed) {
            self.emit(LitraEvent::PhaseChanged {
                from: SessionPhase::Claimed,
                to: SessionPhase::Active,
            });
        }
    }

    /// Acknowledgements come back on the IN side of the command endpoint.
    fn ack_endpoint(&self) -> u8 {
        self.product.endpoint_address | ENDPOINT_DIR_IN
    }

    fn packet(&self, direction: PacketDirection, endpoint: u8, data: &[u8]) {
        self.emit(LitraEvent::Packet {
            direction,
            endpoint,
            length: data.len(),
            data: Some(data.to_vec()),
        });
    }

    /// Encode, write and (optionally) read back the acknowledgement.
    fn send_command(
        &self,
        command: CommandCode,
        value: u64,
        want_ack: bool,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        let buffer = protocol::encode(command, value)?;
        let timeout = self.config.command_timeout();

        let ack = {
            let transport = lock(&self.transport);
            self.ensure_open()?;

            transport.write(self.product.endpoint_address, buffer.as_bytes(), timeout)?;
            self.packet(PacketDirection::Tx, self.product.endpoint_address, buffer.as_bytes());

            if want_ack {
                let ack = transport.read(
                    self.ack_endpoint(),
                    self.product.report_buffer_length as usize,
                    timeout,
                )?;
                self.packet(PacketDirection::Rx, self.ack_endpoint(), &ack);
                Some(ack)
            } else {
                None
            }
        };

        self.mark_active();
        self.emit(LitraEvent::CommandSent { command, value });
        Ok(ack)
    }

    fn record(&self, update: FieldUpdate) {
        let snapshot = {
            let mut state = lock(&self.state);
            match state.apply(&update) {
                Ok(true) => *state,
                _ => return,
            }
        };
        self.emit(LitraEvent::StateChanged {
            update,
            state: snapshot,
        });
    }

    fn set_power(&self, on: bool) -> Result<(), SessionError> {
        let value = if on { LIGHT_ON } else { LIGHT_OFF };
        self.send_command(CommandCode::Power, value.into(), self.config.read_acknowledgement)?;
        self.record(FieldUpdate::Power(on));
        Ok(())
    }

    pub fn turn_on(&self) -> Result<(), SessionError> {
        self.set_power(true)
    }

    pub fn turn_off(&self) -> Result<(), SessionError> {
        self.set_power(false)
    }

    /// Set brightness (20..=250).
    ///
    /// Out-of-range values are not an error: they are logged, nothing is
    /// sent, and `Ok(false)` is returned.
    pub fn set_brightness(&self, value: u16) -> Result<bool, SessionError> {
        self.ensure_open()?;
        if !brightness_in_range(value) {
            warn!(
                value,
                "Invalid brightness value, ignoring (must be between 20 and 250)"
            );
            self.emit(LitraEvent::ValueRejected {
                command: CommandCode::Brightness,
                value: value.into(),
            });
            return Ok(false);
        }
        self.send_command(
            CommandCode::Brightness,
            value.into(),
            self.config.read_acknowledgement,
        )?;
        self.record(FieldUpdate::Brightness(value));
        Ok(true)
    }

    /// Set color temperature in Kelvin (2700..=6500).
    pub fn set_color_temperature(&self, kelvin: u16) -> Result<(), SessionError> {
        self.ensure_open()?;
        if let Err(e) = check_temperature(kelvin) {
            self.emit(LitraEvent::ValueRejected {
                command: CommandCode::Temperature,
                value: kelvin.into(),
            });
            return Err(e.into());
        }
        self.send_command(
            CommandCode::Temperature,
            kelvin.into(),
            self.config.read_acknowledgement,
        )?;
        self.record(FieldUpdate::Temperature(kelvin));
        Ok(())
    }

    /// Ask the light whether it is on. `None` if the answer was unreadable.
    pub fn query_power(&self) -> Result<Option<bool>, SessionError> {
        let ack = self
            .send_command(CommandCode::PowerGet, 0, true)?
            .unwrap_or_default();

        let power = match protocol::check_prefix(&ack) {
            Ok(()) => match ack.get(PAYLOAD_OFFSET) {
                Some(&LIGHT_OFF) => Some(false),
                Some(&LIGHT_ON) => Some(true),
                _ => None,
            },
            Err(_) => None,
        };

        match power {
            Some(on) => self.record(FieldUpdate::Power(on)),
            None => debug!(ack = %format!("{:02X?}", ack), "Unrecognized power query response"),
        }
        Ok(power)
    }

    /// Decode one inbound report and apply it. Never fails: bad reports are
    /// reported through the observer and dropped.
    pub fn process_report(&self, data: &[u8]) {
        let reason = match protocol::decode(data) {
            Ok(update) => {
                let applied = {
                    let mut state = lock(&self.state);
                    match state.apply(&update) {
                        Ok(true) => Some(*state),
                        Ok(false) | Err(_) => None,
                    }
                };
                match applied {
                    Some(state) => {
                        self.emit(LitraEvent::StateChanged { update, state });
                        return;
                    }
                    None => SkipReason::Rejected(update),
                }
            }
            Err(e) => SkipReason::Decode(e),
        };

        self.emit(LitraEvent::ReportSkipped {
            reason,
            data: data.to_vec(),
        });
    }

    /// Poll the interrupt IN endpoint until `cancel` fires.
    ///
    /// Timeouts are the normal idle case. Returns an error only if the
    /// device disconnects or the session cannot poll at all.
    #[instrument(skip_all, fields(product = self.product.display_name))]
    pub fn run_report_loop(&self, cancel: &CancelToken) -> Result<(), SessionError> {
        let endpoint = {
            let transport = lock(&self.transport);
            self.ensure_open()?;
            transport.input_endpoint()
        }
        .ok_or(SessionError::NoInputEndpoint)?;

        self.mark_active();
        let poll_timeout = self.config.poll_timeout();
        let len = self.product.report_buffer_length as usize;
        info!(endpoint = %format!("0x{:02X}", endpoint), "Polling for reports");

        while !cancel.is_cancelled() {
            let result = {
                let transport = lock(&self.transport);
                if !self.phase().is_open() {
                    debug!("Session closed while polling");
                    break;
                }
                transport.read(endpoint, len, poll_timeout)
            };

            match result {
                Ok(data) if data.is_empty() => {}
                Ok(data) => {
                    self.packet(PacketDirection::Rx, endpoint, &data);
                    self.process_report(&data);
                }
                Err(e) if e.is_timeout() => {}
                Err(TransportError::Disconnected) => {
                    self.emit(LitraEvent::DeviceDisconnected);
                    return Err(TransportError::Disconnected.into());
                }
                Err(e) => {
                    warn!(error = %e, "Transient read error, retrying...");
                    thread::sleep(poll_timeout);
                }
            }
        }

        info!("Report loop stopped");
        Ok(())
    }

    /// Release the transport. Later calls do nothing.
    pub fn close(&self) -> Result<(), SessionError> {
        let mut transport = lock(&self.transport);
        let Some(prev) = lock(&self.phase).goto(SessionPhase::Closed) else {
            return Ok(());
        };

        let result = transport.release();
        drop(transport);

        self.emit(LitraEvent::PhaseChanged {
            from: prev,
            to: SessionPhase::Closed,
        });
        self.emit(LitraEvent::DeviceReleased);
        result.map_err(SessionError::from)
    }
}

impl<T: UsbTransport, O: LitraObserver> Drop for LitraSession<T, O> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to release device");
        }
    }
}

fn release_after_failure<T: UsbTransport>(transport: &mut T) {
    if let Err(e) = transport.release() {
        error!(error = %e, "Failed to release device after setup failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BEAM_PRODUCT_ID, GLOW_PRODUCT_ID, LOGITECH_VENDOR_ID};
    use crate::events::testing::RecordingObserver;
    use crate::protocol::{BUFFER_PREFIX, DecodeError};
    use crate::transport::mock::MOCK_INPUT_ENDPOINT;
    use crate::transport::{MockFailure, MockTransport};

    const GLOW_ACK_EP: u8 = 0x82;

    fn session(mock: &MockTransport) -> (LitraSession<MockTransport, RecordingObserver>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let session =
            LitraSession::with_observer(mock.clone(), SessionConfig::default(), observer.clone())
                .unwrap();
        (session, observer)
    }

    fn report(field: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BUFFER_PREFIX.to_vec();
        buf.push(field);
        buf.extend_from_slice(payload);
        buf.resize(64, 0);
        buf
    }

    fn is_skip(e: &LitraEvent) -> bool {
        matches!(e, LitraEvent::ReportSkipped { .. })
    }

    #[test]
    fn test_glow_session_uses_catalog_parameters() {
        let mock = MockTransport::new();
        let (session, _) = session(&mock);
        let product = session.product();
        assert_eq!(product.display_name, "Glow");
        assert_eq!(product.endpoint_address, 0x02);
        assert_eq!(product.report_buffer_length, 64);
        assert_eq!(session.phase(), SessionPhase::Claimed);
        assert!(session.state().is_unknown());
    }

    #[test]
    fn test_turn_on_writes_power_command() {
        let mock = MockTransport::new();
        mock.queue_read(GLOW_ACK_EP, &report(0x1C, &[0x01]));
        let (session, _) = session(&mock);

        session.turn_on().unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].endpoint, 0x02);
        assert_eq!(writes[0].timeout, Duration::from_millis(3000));
        let mut expected = vec![0x11, 0xFF, 0x04, 0x1C, 0x01];
        expected.resize(20, 0);
        assert_eq!(writes[0].data, expected);

        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.state().power(), Some(true));
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn test_turn_off_on_beam() {
        let mock = MockTransport::with_ids(LOGITECH_VENDOR_ID, BEAM_PRODUCT_ID);
        mock.queue_read(0x81, &[0u8; 32]);
        let (session, _) = session(&mock);

        session.turn_off().unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes[0].endpoint, 0x01);
        assert_eq!(&writes[0].data[..5], &[0x11, 0xFF, 0x04, 0x1C, 0x00]);
        assert_eq!(session.state().power(), Some(false));
    }

    #[test]
    fn test_missing_ack_is_transport_error() {
        let mock = MockTransport::new();
        let (session, _) = session(&mock);

        let err = session.turn_on().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::Timeout { .. })
        ));
        assert_eq!(session.state().power(), None);
    }

    #[test]
    fn test_write_failure_is_not_retried() {
        let mock = MockTransport::new();
        mock.fail_writes();
        let (session, _) = session(&mock);

        assert!(matches!(
            session.turn_off(),
            Err(SessionError::Transport(TransportError::WriteFailed(_)))
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_acknowledgement_can_be_skipped() {
        let mock = MockTransport::new();
        let observer = Arc::new(RecordingObserver::default());
        let config = SessionConfig {
            read_acknowledgement: false,
            ..Default::default()
        };
        let session = LitraSession::with_observer(mock.clone(), config, observer).unwrap();

        session.turn_on().unwrap();
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_brightness_out_of_range_never_reaches_transport() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        assert!(!session.set_brightness(19).unwrap());
        assert!(!session.set_brightness(251).unwrap());
        assert!(mock.get_writes().is_empty());
        assert_eq!(session.state().brightness(), None);
        assert_eq!(
            observer.count(|e| matches!(e, LitraEvent::ValueRejected { .. })),
            2
        );
    }

    #[test]
    fn test_brightness_in_range_is_sent() {
        let mock = MockTransport::new();
        mock.queue_read(GLOW_ACK_EP, &report(0x4C, &[0xFA]));
        let (session, _) = session(&mock);

        assert!(session.set_brightness(250).unwrap());
        let writes = mock.get_writes();
        assert_eq!(&writes[0].data[..6], &[0x11, 0xFF, 0x04, 0x4C, 0xFA, 0x00]);
        assert_eq!(session.state().brightness(), Some(250));
    }

    #[test]
    fn test_temperature_out_of_range_is_error() {
        let mock = MockTransport::new();
        let (session, _) = session(&mock);

        for kelvin in [2699, 6501] {
            assert!(matches!(
                session.set_color_temperature(kelvin),
                Err(SessionError::InvalidValue(StateError::InvalidTemperature(k))) if k == kelvin
            ));
        }
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_temperature_in_range_is_sent() {
        let mock = MockTransport::new();
        mock.queue_read(GLOW_ACK_EP, &report(0x9C, &[0x0A, 0x8C]));
        let (session, _) = session(&mock);

        session.set_color_temperature(2700).unwrap();
        assert_eq!(&mock.get_writes()[0].data[3..6], &[0x9C, 0x0A, 0x8C]);
        assert_eq!(session.state().temperature(), Some(2700));
    }

    #[test]
    fn test_query_power() {
        let mock = MockTransport::new();
        mock.queue_read(GLOW_ACK_EP, &report(0x1B, &[0x01]));
        let (session, _) = session(&mock);

        assert_eq!(session.query_power().unwrap(), Some(true));
        assert_eq!(mock.get_writes()[0].data[3], 0x1B);
        assert_eq!(session.state().power(), Some(true));
    }

    #[test]
    fn test_query_power_garbage_response() {
        let mock = MockTransport::new();
        mock.queue_read(GLOW_ACK_EP, &[0xDE, 0xAD]);
        let (session, _) = session(&mock);

        assert_eq!(session.query_power().unwrap(), None);
        assert_eq!(session.state().power(), None);
    }

    #[test]
    fn test_rejects_unsupported_device_and_releases() {
        let mock = MockTransport::with_ids(0x8086, GLOW_PRODUCT_ID);
        let result = LitraSession::new(mock.clone(), SessionConfig::default());
        assert!(matches!(
            result,
            Err(SessionError::Validation(CatalogError::UnsupportedVendor(0x8086)))
        ));
        assert_eq!(mock.claim_count(), 0);
        assert_eq!(mock.release_count(), 1);

        let mock = MockTransport::with_ids(LOGITECH_VENDOR_ID, 0xC902);
        assert!(matches!(
            LitraSession::new(mock, SessionConfig::default()),
            Err(SessionError::Validation(CatalogError::UnsupportedProduct(0xC902)))
        ));
    }

    #[test]
    fn test_claim_failure_releases_once() {
        let mock = MockTransport::new();
        mock.set_kernel_driver_active(true);
        mock.fail_claim();

        let result = LitraSession::new(mock.clone(), SessionConfig::default());
        assert!(matches!(result, Err(SessionError::Claim(_))));
        assert_eq!(mock.release_count(), 1);
        assert!(mock.kernel_driver_reattached());
    }

    #[test]
    fn test_close_releases_exactly_once() {
        let mock = MockTransport::new();
        mock.set_kernel_driver_active(true);
        let (session, observer) = session(&mock);

        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.phase(), SessionPhase::Closed);
        drop(session);

        assert_eq!(mock.release_count(), 1);
        assert!(mock.kernel_driver_reattached());
        assert_eq!(
            observer.count(|e| matches!(e, LitraEvent::DeviceReleased)),
            1
        );
    }

    #[test]
    fn test_drop_releases_after_error() {
        let mock = MockTransport::new();
        {
            let (session, _) = session(&mock);
            assert!(session.turn_on().is_err());
        }
        assert_eq!(mock.release_count(), 1);
    }

    #[test]
    fn test_commands_refused_after_close() {
        let mock = MockTransport::new();
        let (session, _) = session(&mock);
        session.close().unwrap();

        assert!(matches!(session.turn_on(), Err(SessionError::Closed)));
        assert!(matches!(session.set_brightness(100), Err(SessionError::Closed)));
        assert!(matches!(
            session.run_report_loop(&CancelToken::new()),
            Err(SessionError::Closed)
        ));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_process_report_applies_brightness() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        session.process_report(&report(16, &[0x00, 0xFA]));
        assert_eq!(session.state().brightness(), Some(250));
        assert_eq!(
            observer.count(|e| matches!(e, LitraEvent::StateChanged { .. })),
            1
        );
    }

    #[test]
    fn test_process_report_rejects_out_of_range_values() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        session.process_report(&report(32, &[0x00, 0x10]));
        session.process_report(&report(16, &[0x01, 0x00]));
        assert!(session.state().is_unknown());
        assert_eq!(observer.count(is_skip), 2);
    }

    #[test]
    fn test_report_loop_skips_bad_prefix_and_continues() {
        let mock = MockTransport::new();
        let mut bad = report(16, &[0x00, 0x50]);
        bad[2] = 0x05;
        mock.queue_read(MOCK_INPUT_ENDPOINT, &bad);
        mock.queue_failure(MOCK_INPUT_ENDPOINT, MockFailure::Timeout);
        mock.queue_read(MOCK_INPUT_ENDPOINT, &report(0, &[0x01]));
        mock.queue_failure(MOCK_INPUT_ENDPOINT, MockFailure::Disconnected);
        let (session, observer) = session(&mock);

        let result = session.run_report_loop(&CancelToken::new());
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Disconnected))
        ));

        let skipped: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                LitraEvent::ReportSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0].decode_error(),
            Some(DecodeError::MalformedReport { .. })
        ));

        let state = session.state();
        assert_eq!(state.power(), Some(true));
        assert_eq!(state.brightness(), None);
    }

    #[test]
    fn test_report_loop_survives_transient_errors() {
        let mock = MockTransport::new();
        mock.queue_failure(MOCK_INPUT_ENDPOINT, MockFailure::Io);
        mock.queue_read(MOCK_INPUT_ENDPOINT, &report(32, &[0x0F, 0xA0]));
        mock.queue_failure(MOCK_INPUT_ENDPOINT, MockFailure::Disconnected);
        let observer = Arc::new(RecordingObserver::default());
        let config = SessionConfig {
            poll_timeout_ms: 1,
            ..Default::default()
        };
        let session = LitraSession::with_observer(mock.clone(), config, observer).unwrap();

        assert!(session.run_report_loop(&CancelToken::new()).is_err());
        assert_eq!(session.state().temperature(), Some(4000));
    }

    #[test]
    fn test_report_loop_stops_on_cancel() {
        let mock = MockTransport::new();
        mock.queue_read(MOCK_INPUT_ENDPOINT, &report(16, &[0x00, 0x64]));
        let (session, _) = session(&mock);
        let session = Arc::new(session);
        let cancel = CancelToken::new();

        let poller = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            thread::spawn(move || session.run_report_loop(&cancel))
        };

        while session.state().brightness().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();

        assert!(poller.join().unwrap().is_ok());
        assert_eq!(session.state().brightness(), Some(100));
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[test]
    fn test_commands_interleave_with_polling() {
        let mock = MockTransport::new();
        let (session, _) = session(&mock);
        let session = Arc::new(session);
        let cancel = CancelToken::new();

        let poller = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            thread::spawn(move || session.run_report_loop(&cancel))
        };

        mock.queue_read(GLOW_ACK_EP, &report(0x1C, &[0x00]));
        session.turn_off().unwrap();
        cancel.cancel();
        poller.join().unwrap().unwrap();

        assert_eq!(session.state().power(), Some(false));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = SessionConfig {
            poll_timeout_ms: 250,
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);

        let partial: SessionConfig = toml::from_str("command_timeout_ms = 500").unwrap();
        assert_eq!(partial.command_timeout(), Duration::from_millis(500));
        assert_eq!(partial.poll_timeout(), Duration::from_millis(100));
    }
}
