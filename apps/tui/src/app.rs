//! Application state and logic.
//!
//! Contains the app state (Model), input handling (Controller).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use litra_core::device;
use litra_core::events::{LitraEvent, LitraObserver, LogLevel, PacketDirection};
use litra_core::protocol::{MAX_BRIGHTNESS, MAX_TEMPERATURE, MIN_BRIGHTNESS, MIN_TEMPERATURE};
use litra_core::session::{CancelToken, LitraSession, SessionConfig, SessionError};
use litra_core::state::{DeviceState, SessionPhase};
use litra_core::transport::NusbTransport;

/// Maximum log entries to keep.
const MAX_LOG_ENTRIES: usize = 1000;

/// Maximum packets to keep.
const MAX_PACKETS: usize = 1000;

const BRIGHTNESS_STEP: i32 = 10;
const TEMPERATURE_STEP: i32 = 100;

type Session = LitraSession<NusbTransport, TuiObserver>;

/// Application state.
pub struct App {
    /// Whether to quit the application.
    pub should_quit: bool,
    /// Current view/tab.
    pub current_tab: Tab,
    /// Session configuration.
    pub config: SessionConfig,
    /// Current session phase.
    pub phase: SessionPhase,
    /// Last known light state.
    pub state: DeviceState,
    /// Reports dropped because they did not decode or validate.
    pub skipped_reports: usize,
    /// Log entries.
    pub logs: VecDeque<LogEntry>,
    /// Log scroll position.
    pub log_scroll: usize,
    /// Device status.
    pub device_status: DeviceStatus,
    /// Shared observer for receiving events from the session.
    pub observer: Arc<TuiObserver>,
    session: Option<Arc<Session>>,
    cancel: CancelToken,
    /// Background polling thread handle.
    poll_thread: Option<JoinHandle<()>>,
    /// Recent packets
    pub packets: VecDeque<PacketInfo>,
    /// Packet scroll position
    pub packet_scroll: usize,
}

/// Tab/view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Main,
    Logs,
    Packets,
    Help,
}

/// Device connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected,
    Connected {
        product: &'static str,
        vid: u16,
        pid: u16,
    },
}

/// Log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

/// Packet info for display.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub direction: PacketDirection,
    pub timestamp: String,
    pub endpoint: u8,
    pub length: usize,
    pub data_preview: String,
}

/// TUI observer that collects events for display.
pub struct TuiObserver {
    events: Mutex<VecDeque<LitraEvent>>,
}

impl TuiObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(100)),
        }
    }

    pub fn drain_events(&self) -> Vec<LitraEvent> {
        let mut events = self.events.lock().unwrap();
        events.drain(..).collect()
    }
}

impl Default for TuiObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LitraObserver for TuiObserver {
    fn on_event(&self, event: &LitraEvent) {
        let mut events = self.events.lock().unwrap();
        if events.len() >= 100 {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

/// Next brightness after a key press, clamped to the valid range.
pub fn step_brightness(current: Option<u16>, delta: i32) -> u16 {
    step(current, delta, MIN_BRIGHTNESS, MAX_BRIGHTNESS)
}

/// Next color temperature after a key press, clamped to the valid range.
pub fn step_temperature(current: Option<u16>, delta: i32) -> u16 {
    step(current, delta, MIN_TEMPERATURE, MAX_TEMPERATURE)
}

fn step(current: Option<u16>, delta: i32, min: u16, max: u16) -> u16 {
    match current {
        // Unknown: start from the low end.
        None => min,
        Some(v) => (i32::from(v) + delta).clamp(min.into(), max.into()) as u16,
    }
}

impl App {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            should_quit: false,
            current_tab: Tab::Main,
            config,
            phase: SessionPhase::Uninitialized,
            state: DeviceState::new(),
            skipped_reports: 0,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            log_scroll: 0,
            device_status: DeviceStatus::Disconnected,
            observer: Arc::new(TuiObserver::new()),
            session: None,
            cancel: CancelToken::new(),
            poll_thread: None,
            packets: VecDeque::with_capacity(MAX_PACKETS),
            packet_scroll: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Claim the first attached light and start polling it.
    pub fn connect(&mut self) {
        if self.session.is_some() {
            return;
        }

        let found = match device::discover() {
            Ok(devices) => devices.into_iter().next(),
            Err(e) => {
                self.add_log(LogLevel::Error, format!("Enumeration failed: {}", e));
                return;
            }
        };
        let Some(found) = found else {
            self.add_log(LogLevel::Warn, "No Litra device found (press 'r' to retry)");
            return;
        };

        let session = found
            .open()
            .map_err(SessionError::from)
            .and_then(|t| LitraSession::with_observer(t, self.config.clone(), self.observer.clone()));

        let session = match session {
            Ok(s) => Arc::new(s),
            Err(e) => {
                self.add_log(LogLevel::Error, format!("Failed to open {}: {}", found, e));
                return;
            }
        };

        self.add_log(LogLevel::Info, format!("Connected to {}", found));
        self.cancel = CancelToken::new();

        let poller = Arc::clone(&session);
        let cancel = self.cancel.clone();
        let observer = self.observer.clone();
        self.poll_thread = Some(thread::spawn(move || {
            if let Err(e) = poller.run_report_loop(&cancel) {
                observer.on_event(&LitraEvent::Log {
                    level: LogLevel::Error,
                    message: format!("Polling stopped: {}", e),
                });
            }
        }));
        self.session = Some(session);
    }

    /// Stop polling and release the device.
    pub fn disconnect(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                self.add_log(LogLevel::Error, format!("Release failed: {}", e));
            }
        }
        self.on_tick();
    }

    /// Run a command off the UI thread so a slow acknowledgement can't
    /// freeze the screen.
    fn command<F>(&mut self, label: &'static str, f: F)
    where
        F: FnOnce(&Session) -> Result<(), SessionError> + Send + 'static,
    {
        let Some(session) = self.session.clone() else {
            self.add_log(LogLevel::Warn, "No device connected");
            return;
        };
        let observer = self.observer.clone();
        thread::spawn(move || {
            if let Err(e) = f(&session) {
                observer.on_event(&LitraEvent::Log {
                    level: LogLevel::Error,
                    message: format!("{} failed: {}", label, e),
                });
            }
        });
    }

    /// Handle keyboard input. Returns true if app should quit.
    pub fn on_key(&mut self, key: KeyEvent) -> bool {
        // Global shortcuts
        match key.code {
            KeyCode::Char('q') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return true;
            }
            KeyCode::Esc => {
                if self.current_tab != Tab::Main {
                    self.current_tab = Tab::Main;
                    return false;
                }
                self.should_quit = true;
                return true;
            }
            KeyCode::F(1) => {
                self.current_tab = Tab::Help;
                return false;
            }
            KeyCode::F(2) => {
                self.current_tab = Tab::Logs;
                return false;
            }
            KeyCode::F(3) => {
                self.current_tab = Tab::Packets;
                return false;
            }
            _ => {}
        }

        // Tab-specific handling
        match self.current_tab {
            Tab::Main => self.handle_main_key(key),
            Tab::Logs => self.handle_logs_key(key),
            Tab::Packets => self.handle_packets_key(key),
            Tab::Help => {
                // Any key returns to main
                self.current_tab = Tab::Main;
            }
        }

        false
    }

    fn handle_main_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => self.connect(),
            KeyCode::Char('o') => self.command("Turn on", |s| s.turn_on()),
            KeyCode::Char('f') => self.command("Turn off", |s| s.turn_off()),
            KeyCode::Char('s') => self.command("Status", |s| s.query_power().map(|_| ())),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let value = step_brightness(self.state.brightness(), BRIGHTNESS_STEP);
                self.command("Brightness", move |s| s.set_brightness(value).map(|_| ()));
            }
            KeyCode::Char('-') => {
                let value = step_brightness(self.state.brightness(), -BRIGHTNESS_STEP);
                self.command("Brightness", move |s| s.set_brightness(value).map(|_| ()));
            }
            KeyCode::Char(']') => {
                let value = step_temperature(self.state.temperature(), TEMPERATURE_STEP);
                self.command("Temperature", move |s| s.set_color_temperature(value));
            }
            KeyCode::Char('[') => {
                let value = step_temperature(self.state.temperature(), -TEMPERATURE_STEP);
                self.command("Temperature", move |s| s.set_color_temperature(value));
            }
            _ => {}
        }
    }

    fn handle_logs_key(&mut self, key: KeyEvent) {
        let len = self.logs.len();
        scroll(&mut self.log_scroll, len, key.code);
    }

    fn handle_packets_key(&mut self, key: KeyEvent) {
        let len = self.packets.len();
        scroll(&mut self.packet_scroll, len, key.code);
    }

    /// Called on each tick - process observer events.
    pub fn on_tick(&mut self) {
        let events = self.observer.drain_events();
        for event in events {
            self.process_event(event);
        }
    }

    pub fn process_event(&mut self, event: LitraEvent) {
        match event {
            LitraEvent::DeviceClaimed {
                product,
                vid,
                pid,
                kernel_driver_detached,
            } => {
                self.device_status = DeviceStatus::Connected { product, vid, pid };
                self.add_log(
                    LogLevel::Info,
                    format!(
                        "Claimed Litra {} ({:04X}:{:04X}){}",
                        product,
                        vid,
                        pid,
                        if kernel_driver_detached {
                            ", kernel driver detached"
                        } else {
                            ""
                        }
                    ),
                );
            }
            LitraEvent::DeviceReleased => {
                self.device_status = DeviceStatus::Disconnected;
                self.add_log(LogLevel::Info, "Device released");
            }
            LitraEvent::DeviceDisconnected => {
                self.device_status = DeviceStatus::Disconnected;
                self.add_log(LogLevel::Warn, "Device disconnected");
            }
            LitraEvent::PhaseChanged { to, .. } => {
                self.phase = to;
                self.add_log(LogLevel::Debug, format!("Phase: {}", to));
            }
            LitraEvent::CommandSent { command, value } => {
                self.add_log(LogLevel::Info, format!("Sent {} {}", command, value));
            }
            LitraEvent::ValueRejected { command, value } => {
                self.add_log(
                    LogLevel::Warn,
                    format!("{} {} is out of range, not sent", command, value),
                );
            }
            LitraEvent::StateChanged { update, state } => {
                self.state = state;
                self.add_log(LogLevel::Info, format!("Light reported {}", update));
            }
            LitraEvent::ReportSkipped { reason, .. } => {
                self.skipped_reports += 1;
                self.add_log(LogLevel::Warn, format!("Skipped report: {}", reason));
            }
            LitraEvent::Log { level, message } => {
                self.add_log(level, message);
            }
            LitraEvent::Packet {
                direction,
                endpoint,
                length,
                data,
            } => {
                let now = chrono::Local::now();
                let data_preview = data
                    .map(|d| {
                        d.iter()
                            .map(|b| format!("{:02X}", b))
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();

                if self.packets.len() >= MAX_PACKETS {
                    self.packets.pop_front();
                }
                self.packets.push_back(PacketInfo {
                    direction,
                    timestamp: now.format("%H:%M:%S.%3f").to_string(),
                    endpoint,
                    length,
                    data_preview,
                });
                // Auto-scroll
                self.packet_scroll = self.packets.len().saturating_sub(1);
            }
        }
    }

    fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        let now = chrono::Local::now();
        let entry = LogEntry {
            level,
            message: message.into(),
            timestamp: now.format("%H:%M:%S").to_string(),
        };

        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);

        // Auto-scroll to bottom
        self.log_scroll = self.logs.len().saturating_sub(1);
    }
}

fn scroll(pos: &mut usize, len: usize, code: KeyCode) {
    let last = len.saturating_sub(1);
    match code {
        KeyCode::Up | KeyCode::Char('k') => *pos = pos.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => *pos = (*pos + 1).min(last),
        KeyCode::PageUp => *pos = pos.saturating_sub(10),
        KeyCode::PageDown => *pos = (*pos + 10).min(last),
        KeyCode::Home => *pos = 0,
        KeyCode::End => *pos = last,
        _ => {}
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litra_core::protocol::FieldUpdate;

    #[test]
    fn test_brightness_steps_clamp() {
        assert_eq!(step_brightness(None, 10), 20);
        assert_eq!(step_brightness(Some(100), 10), 110);
        assert_eq!(step_brightness(Some(245), 10), 250);
        assert_eq!(step_brightness(Some(25), -10), 20);
    }

    #[test]
    fn test_temperature_steps_clamp() {
        assert_eq!(step_temperature(None, 100), 2700);
        assert_eq!(step_temperature(Some(4000), -100), 3900);
        assert_eq!(step_temperature(Some(6450), 100), 6500);
    }

    #[test]
    fn test_state_change_updates_display() {
        let mut app = App::new(SessionConfig::default());
        let mut state = DeviceState::new();
        let _ = state.set_brightness(120);
        app.observer.on_event(&LitraEvent::StateChanged {
            update: FieldUpdate::Brightness(120),
            state,
        });
        app.on_tick();

        assert_eq!(app.state.brightness(), Some(120));
        assert_eq!(app.logs.len(), 1);
    }

    #[test]
    fn test_commands_without_device_are_logged() {
        let mut app = App::new(SessionConfig::default());
        app.on_key(KeyEvent::from(KeyCode::Char('o')));
        assert!(!app.is_connected());
        assert_eq!(app.logs.back().map(|l| l.level), Some(LogLevel::Warn));
    }

    #[test]
    fn test_tabs_and_quit() {
        let mut app = App::new(SessionConfig::default());
        assert!(!app.on_key(KeyEvent::from(KeyCode::F(3))));
        assert_eq!(app.current_tab, Tab::Packets);
        assert!(!app.on_key(KeyEvent::from(KeyCode::Esc)));
        assert_eq!(app.current_tab, Tab::Main);
        assert!(app.on_key(KeyEvent::from(KeyCode::Esc)));
    }
}
