//! Canonical enums for settings the wire spells as flags or tokens

use aircon_protocol::SleepReading;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

/// Louver swing, combining the unit's horizontal and vertical flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwingMode {
    #[default]
    Off,
    Horizontal,
    Vertical,
    Both,
}

impl SwingMode {
    pub fn from_flags(horizontal: bool, vertical: bool) -> Self {
        match (horizontal, vertical) {
            (false, false) => SwingMode::Off,
            (true, false) => SwingMode::Horizontal,
            (false, true) => SwingMode::Vertical,
            (true, true) => SwingMode::Both,
        }
    }

    pub fn horizontal(self) -> bool {
        matches!(self, SwingMode::Horizontal | SwingMode::Both)
    }

    pub fn vertical(self) -> bool {
        matches!(self, SwingMode::Vertical | SwingMode::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SleepMode {
    On,
    #[default]
    Off,
}

impl SleepMode {
    pub fn is_on(self) -> bool {
        self == SleepMode::On
    }

    /// Canonical mode for a reported profile token, `None` when unrecognised
    pub fn from_token(token: &str) -> Option<Self> {
        match SleepReading::classify(token) {
            SleepReading::On => Some(SleepMode::On),
            SleepReading::Off => Some(SleepMode::Off),
            SleepReading::Unknown => None,
        }
    }
}

impl From<bool> for SleepMode {
    fn from(on: bool) -> Self {
        if on {
            SleepMode::On
        } else {
            SleepMode::Off
        }
    }
}
