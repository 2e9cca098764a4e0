//! Plain-data view of a device's canonical settings

use aircon_protocol::{FanSpeed, OperationMode};
use serde::{Deserialize, Serialize};

use super::{PowerState, SleepMode, SwingMode};

/// Canonical settings at one point in time.
///
/// Temperatures are in Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub power: PowerState,
    pub mode: OperationMode,
    /// Rounded to 0.5 °C, within the unit's range
    pub target_temperature: f64,
    /// Rounded to 0.1 °C
    pub current_temperature: f64,
    pub outdoor_temperature: Option<f64>,
    pub fan_speed: FanSpeed,
    pub swing: SwingMode,
    pub sleep: SleepMode,
    pub eco: bool,
    pub turbo: bool,
    pub display: bool,
    pub beep: bool,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            mode: OperationMode::Cool,
            target_temperature: 24.0,
            current_temperature: 24.0,
            outdoor_temperature: None,
            fan_speed: FanSpeed::Auto,
            swing: SwingMode::Off,
            sleep: SleepMode::Off,
            eco: false,
            turbo: false,
            display: true,
            beep: true,
        }
    }
}
