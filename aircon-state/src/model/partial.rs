//! Sparse set of canonical changes

use aircon_protocol::{DeviceOptions, FanSpeed, OperationMode};
use serde::{Deserialize, Serialize};

use super::{PowerState, SleepMode, SwingMode};
use crate::units;

/// Fields to change, `None` meaning "leave as is".
///
/// Produced by [`DeviceState::diff`](crate::DeviceState::diff) and consumed by
/// [`DeviceState::update_from_options`](crate::DeviceState::update_from_options).
/// Measured temperatures are read-only and have no counterpart here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDeviceState {
    pub power: Option<PowerState>,
    pub mode: Option<OperationMode>,
    /// Celsius
    pub target_temperature: Option<f64>,
    pub fan_speed: Option<FanSpeed>,
    pub swing: Option<SwingMode>,
    pub sleep: Option<SleepMode>,
    pub eco: Option<bool>,
    pub turbo: Option<bool>,
    pub display: Option<bool>,
    pub beep: Option<bool>,
}

impl PartialDeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == PartialDeviceState::default()
    }

    /// True when the change switches the unit off
    pub fn turns_off(&self) -> bool {
        self.power == Some(PowerState::Off)
    }

    /// Reduce to just the power change.
    ///
    /// Settings sent alongside a power-off are ignored by the unit, so a delta
    /// that turns the unit off carries nothing else.
    pub fn power_only(&self) -> PartialDeviceState {
        PartialDeviceState {
            power: self.power,
            ..Default::default()
        }
    }

    /// Wire options carrying the same changes
    pub fn to_device_options(&self) -> DeviceOptions {
        DeviceOptions {
            power: self.power.map(PowerState::is_on),
            mode: self.mode,
            target_temp_f: self.target_temperature.map(units::target_to_wire),
            fan_speed: self.fan_speed,
            swing_horizontal: self.swing.map(SwingMode::horizontal),
            swing_vertical: self.swing.map(SwingMode::vertical),
            turbo: self.turbo,
            sleep: self.sleep.map(SleepMode::is_on),
            eco: self.eco,
            display: self.display,
            beep: self.beep,
        }
    }
}
