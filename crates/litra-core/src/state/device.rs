//! Last known power, brightness and color temperature of a light.

use std::fmt;
use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{FieldUpdate, MAX_BRIGHTNESS, MAX_TEMPERATURE, MIN_BRIGHTNESS, MIN_TEMPERATURE};

pub const BRIGHTNESS_RANGE: RangeInclusive<u16> = MIN_BRIGHTNESS..=MAX_BRIGHTNESS;
pub const TEMPERATURE_RANGE: RangeInclusive<u16> = MIN_TEMPERATURE..=MAX_TEMPERATURE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid colour temperature {0}K (must be between 2700 and 6500K)")]
    InvalidTemperature(u16),
}

/// Device state. Every field starts unknown.
///
/// Setters follow two contracts: an out-of-range brightness is ignored with
/// a warning, an out-of-range temperature is an error. Either way the
/// previous value is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    power: Option<bool>,
    brightness: Option<u16>,
    temperature: Option<u16>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(&self) -> Option<bool> {
        self.power
    }

    pub fn brightness(&self) -> Option<u16> {
        self.brightness
    }

    pub fn temperature(&self) -> Option<u16> {
        self.temperature
    }

    pub fn set_power(&mut self, on: bool) {
        debug!(power = on, "Setting power");
        self.power = Some(on);
    }

    /// Returns `false` (and keeps the old value) when `value` is outside
    /// 20..=250.
    #[must_use = "an out-of-range brightness is silently ignored"]
    pub fn set_brightness(&mut self, value: u16) -> bool {
        if !brightness_in_range(value) {
            warn!(
                value,
                "Invalid brightness value, ignoring (must be between 20 and 250)"
            );
            return false;
        }
        debug!(brightness = value, "Setting brightness");
        self.brightness = Some(value);
        true
    }

    pub fn set_temperature(&mut self, value: u16) -> Result<(), StateError> {
        check_temperature(value)?;
        debug!(temperature = value, "Setting temperature");
        self.temperature = Some(value);
        Ok(())
    }

    /// Route a decoded report to its setter. Returns whether the update was
    /// taken.
    pub fn apply(&mut self, update: &FieldUpdate) -> Result<bool, StateError> {
        match *update {
            FieldUpdate::Power(on) => {
                self.set_power(on);
                Ok(true)
            }
            FieldUpdate::Brightness(v) => Ok(self.set_brightness(v)),
            FieldUpdate::Temperature(v) => self.set_temperature(v).map(|()| true),
        }
    }

    /// True until any field has been learned.
    pub fn is_unknown(&self) -> bool {
        self.power.is_none() && self.brightness.is_none() && self.temperature.is_none()
    }
}

pub fn brightness_in_range(value: u16) -> bool {
    BRIGHTNESS_RANGE.contains(&value)
}

pub fn check_temperature(value: u16) -> Result<(), StateError> {
    if TEMPERATURE_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(StateError::InvalidTemperature(value))
    }
}

struct Unknown<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for Unknown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "?"),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let power = self.power.map(|on| if on { "on" } else { "off" });
        write!(
            f,
            "Power: {}; Brightness: {}; Temperature: {}K",
            Unknown(power),
            Unknown(self.brightness),
            Unknown(self.temperature)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        let state = DeviceState::new();
        assert!(state.is_unknown());
        assert_eq!(state.power(), None);
        assert_eq!(state.brightness(), None);
        assert_eq!(state.temperature(), None);
    }

    #[test]
    fn test_brightness_bounds() {
        let mut state = DeviceState::new();
        assert!(state.set_brightness(20));
        assert_eq!(state.brightness(), Some(20));
        assert!(state.set_brightness(250));
        assert_eq!(state.brightness(), Some(250));

        assert!(!state.set_brightness(19));
        assert!(!state.set_brightness(251));
        assert_eq!(state.brightness(), Some(250));
    }

    #[test]
    fn test_rejected_brightness_on_fresh_state() {
        let mut state = DeviceState::new();
        assert!(!state.set_brightness(0));
        assert!(state.is_unknown());
    }

    #[test]
    fn test_temperature_bounds() {
        let mut state = DeviceState::new();
        state.set_temperature(2700).unwrap();
        state.set_temperature(6500).unwrap();
        assert_eq!(state.temperature(), Some(6500));

        assert_eq!(
            state.set_temperature(2699),
            Err(StateError::InvalidTemperature(2699))
        );
        assert_eq!(
            state.set_temperature(6501),
            Err(StateError::InvalidTemperature(6501))
        );
        assert_eq!(state.temperature(), Some(6500));
    }

    #[test]
    fn test_apply_routes_by_field() {
        let mut state = DeviceState::new();
        assert!(state.apply(&FieldUpdate::Power(true)).unwrap());
        assert!(state.apply(&FieldUpdate::Brightness(100)).unwrap());
        assert!(state.apply(&FieldUpdate::Temperature(4000)).unwrap());
        assert_eq!(state.power(), Some(true));
        assert_eq!(state.brightness(), Some(100));
        assert_eq!(state.temperature(), Some(4000));

        assert!(!state.apply(&FieldUpdate::Brightness(5)).unwrap());
        assert!(state.apply(&FieldUpdate::Temperature(9000)).is_err());
        assert_eq!(state.brightness(), Some(100));
        assert_eq!(state.temperature(), Some(4000));
    }

    #[test]
    fn test_display() {
        let mut state = DeviceState::new();
        assert_eq!(
            state.to_string(),
            "Power: ?; Brightness: ?; Temperature: ?K"
        );
        state.set_power(true);
        assert!(state.set_brightness(80));
        state.set_temperature(5000).unwrap();
        assert_eq!(
            state.to_string(),
            "Power: on; Brightness: 80; Temperature: 5000K"
        );
    }
}
