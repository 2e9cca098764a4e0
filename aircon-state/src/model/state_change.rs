//! Change notifications emitted by [`DeviceState`](crate::DeviceState)

use serde::{Deserialize, Serialize};

use super::StateSnapshot;

/// Which mutation path produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeSource {
    /// Status reported by the unit
    Device,
    /// Local intent applied optimistically
    Options,
}

/// A mutation that changed at least one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: StateSnapshot,
    pub current: StateSnapshot,
    pub source: ChangeSource,
}

impl StateChange {
    pub fn power_changed(&self) -> bool {
        self.previous.power != self.current.power
    }

    pub fn temperature_changed(&self) -> bool {
        self.previous.current_temperature != self.current.current_temperature
            || self.previous.target_temperature != self.current.target_temperature
    }
}
