//! Wire-level value types shared by the codec and the client

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Sleep profile the unit reports while sleep mode is active.
pub const SLEEP_ON_TOKEN: &str = "sleepMode1:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0";

/// Sleep profile the unit reports while sleep mode is inactive.
pub const SLEEP_OFF_TOKEN: &str = "off:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0:0";

/// Encode an on/off flag the way the unit spells it.
pub fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Decode an on/off flag, case-insensitively.
pub fn parse_on_off(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Operating mode (`BaseMode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    Cool,
    Heat,
    Dry,
    Fan,
    Auto,
}

impl OperationMode {
    pub fn as_wire(self) -> &'static str {
        match self {
            OperationMode::Cool => "cool",
            OperationMode::Heat => "heat",
            OperationMode::Dry => "dehumi",
            OperationMode::Fan => "fan",
            OperationMode::Auto => "selfFeel",
        }
    }
}

impl FromStr for OperationMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cool" => Ok(OperationMode::Cool),
            "heat" => Ok(OperationMode::Heat),
            "dehumi" | "dry" => Ok(OperationMode::Dry),
            "fan" => Ok(OperationMode::Fan),
            "selfFeel" | "auto" => Ok(OperationMode::Auto),
            other => Err(ProtocolError::InvalidValue {
                field: "BaseMode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Named fan speed levels (`WindSpeed`), in ascending airflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FanSpeed {
    Auto,
    Silent,
    Low,
    MediumLow,
    Medium,
    MediumHigh,
    High,
    Turbo,
}

/// Levels reachable from a numeric reading. Turbo shares High's percentage,
/// so it is only ever selected by its literal token.
const NUMERIC_LEVELS: [FanSpeed; 7] = [
    FanSpeed::Auto,
    FanSpeed::Silent,
    FanSpeed::Low,
    FanSpeed::MediumLow,
    FanSpeed::Medium,
    FanSpeed::MediumHigh,
    FanSpeed::High,
];

impl FanSpeed {
    /// All levels, ascending.
    pub const ALL: [FanSpeed; 8] = [
        FanSpeed::Auto,
        FanSpeed::Silent,
        FanSpeed::Low,
        FanSpeed::MediumLow,
        FanSpeed::Medium,
        FanSpeed::MediumHigh,
        FanSpeed::High,
        FanSpeed::Turbo,
    ];

    pub fn as_wire(self) -> &'static str {
        match self {
            FanSpeed::Auto => "Auto",
            FanSpeed::Silent => "Silent",
            FanSpeed::Low => "Low",
            FanSpeed::MediumLow => "MediumLow",
            FanSpeed::Medium => "Middle",
            FanSpeed::MediumHigh => "MediumHigh",
            FanSpeed::High => "High",
            FanSpeed::Turbo => "Turbo",
        }
    }

    /// Nominal airflow percentage of the level
    pub fn percent(self) -> u8 {
        match self {
            FanSpeed::Auto => 0,
            FanSpeed::Silent => 15,
            FanSpeed::Low => 30,
            FanSpeed::MediumLow => 45,
            FanSpeed::Medium => 60,
            FanSpeed::MediumHigh => 75,
            FanSpeed::High | FanSpeed::Turbo => 100,
        }
    }

    /// Map a numeric airflow reading onto the nearest named level.
    ///
    /// `0` and `100` resolve by exact match first (Auto and High). Anything
    /// else picks the level with the smallest absolute distance; on a tie the
    /// higher-airflow level wins.
    pub fn from_percent(value: f64) -> FanSpeed {
        let value = value.clamp(0.0, 100.0);
        if value == 0.0 {
            return FanSpeed::Auto;
        }
        if value == 100.0 {
            return FanSpeed::High;
        }

        let mut best = (FanSpeed::Auto, f64::INFINITY);
        for level in NUMERIC_LEVELS {
            let distance = (f64::from(level.percent()) - value).abs();
            // `<=` lets the later (higher) level take a tie
            if distance <= best.1 {
                best = (level, distance);
            }
        }
        best.0
    }

    /// Decode a `WindSpeed` token: a known literal, or a 0-100 number.
    pub fn from_wire(token: &str) -> Result<FanSpeed, ProtocolError> {
        let token = token.trim();
        let literal = match token {
            "Auto" => Some(FanSpeed::Auto),
            "Silent" => Some(FanSpeed::Silent),
            "Low" => Some(FanSpeed::Low),
            "MediumLow" => Some(FanSpeed::MediumLow),
            "Middle" | "Medium" => Some(FanSpeed::Medium),
            "MediumHigh" => Some(FanSpeed::MediumHigh),
            "High" => Some(FanSpeed::High),
            "Turbo" => Some(FanSpeed::Turbo),
            _ => None,
        };
        if let Some(level) = literal {
            return Ok(level);
        }

        let invalid = || ProtocolError::InvalidValue {
            field: "WindSpeed",
            value: token.to_string(),
        };
        let value: f64 = token.parse().map_err(|_| invalid())?;
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(invalid());
        }
        Ok(FanSpeed::from_percent(value))
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// How a reported sleep-profile token should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReading {
    /// `sleepModeN:...`, the unit confirms an active profile
    On,
    /// `off:...`
    Off,
    /// Anything else
    Unknown,
}

impl SleepReading {
    pub fn classify(token: &str) -> SleepReading {
        let token = token.trim();
        if token.starts_with("sleepMode") {
            SleepReading::On
        } else if token.starts_with("off") {
            SleepReading::Off
        } else {
            SleepReading::Unknown
        }
    }
}

/// Flat record decoded from a `statusUpdateMsg`.
///
/// Temperatures are in Fahrenheit, as the unit reports them. Optional fields
/// are `None` when the tag was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceStatus {
    pub power: bool,
    pub mode: OperationMode,
    pub set_temp_f: f64,
    pub current_temp_f: f64,
    pub outdoor_temp_f: Option<f64>,
    pub fan_speed: FanSpeed,
    pub swing_horizontal: Option<bool>,
    pub swing_vertical: Option<bool>,
    pub display: Option<bool>,
    pub beep: Option<bool>,
    pub eco: Option<bool>,
    pub turbo: Option<bool>,
    pub sleep_profile: Option<String>,
    pub device_name: Option<String>,
    pub wifi_version: Option<String>,
}

impl Default for RawDeviceStatus {
    fn default() -> Self {
        Self {
            power: false,
            mode: OperationMode::Cool,
            set_temp_f: 75.0,
            current_temp_f: 75.0,
            outdoor_temp_f: None,
            fan_speed: FanSpeed::Auto,
            swing_horizontal: None,
            swing_vertical: None,
            display: None,
            beep: None,
            eco: None,
            turbo: None,
            sleep_profile: None,
            device_name: None,
            wifi_version: None,
        }
    }
}

/// An ordered set of option changes carried by one `SetMessage`.
///
/// Fields are always written in declaration order, which keeps combined
/// changes (fan speed with sleep profile, turbo with sleep profile)
/// consistent on the unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceOptions {
    pub power: Option<bool>,
    pub mode: Option<OperationMode>,
    pub target_temp_f: Option<f64>,
    pub fan_speed: Option<FanSpeed>,
    pub swing_horizontal: Option<bool>,
    pub swing_vertical: Option<bool>,
    pub turbo: Option<bool>,
    pub sleep: Option<bool>,
    pub eco: Option<bool>,
    pub display: Option<bool>,
    pub beep: Option<bool>,
}

impl DeviceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power(mut self, on: bool) -> Self {
        self.power = Some(on);
        self
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_target_temp_f(mut self, fahrenheit: f64) -> Self {
        self.target_temp_f = Some(fahrenheit);
        self
    }

    pub fn with_fan_speed(mut self, speed: FanSpeed) -> Self {
        self.fan_speed = Some(speed);
        self
    }

    pub fn with_swing(mut self, horizontal: bool, vertical: bool) -> Self {
        self.swing_horizontal = Some(horizontal);
        self.swing_vertical = Some(vertical);
        self
    }

    pub fn with_turbo(mut self, on: bool) -> Self {
        self.turbo = Some(on);
        self
    }

    pub fn with_sleep(mut self, on: bool) -> Self {
        self.sleep = Some(on);
        self
    }

    pub fn with_eco(mut self, on: bool) -> Self {
        self.eco = Some(on);
        self
    }

    pub fn with_display(mut self, on: bool) -> Self {
        self.display = Some(on);
        self
    }

    pub fn with_beep(mut self, on: bool) -> Self {
        self.beep = Some(on);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == DeviceOptions::default()
    }

    /// True when the set does nothing but switch the unit off.
    pub fn is_power_off_only(&self) -> bool {
        *self == DeviceOptions::new().with_power(false)
    }

    /// Merge the intended changes into a status record.
    pub fn apply_to(&self, status: &mut RawDeviceStatus) {
        if let Some(power) = self.power {
            status.power = power;
        }
        if let Some(mode) = self.mode {
            status.mode = mode;
        }
        if let Some(temp) = self.target_temp_f {
            status.set_temp_f = temp;
        }
        if let Some(speed) = self.fan_speed {
            status.fan_speed = speed;
        }
        if let Some(h) = self.swing_horizontal {
            status.swing_horizontal = Some(h);
        }
        if let Some(v) = self.swing_vertical {
            status.swing_vertical = Some(v);
        }
        if let Some(turbo) = self.turbo {
            status.turbo = Some(turbo);
        }
        if let Some(sleep) = self.sleep {
            let token = if sleep { SLEEP_ON_TOKEN } else { SLEEP_OFF_TOKEN };
            status.sleep_profile = Some(token.to_string());
        }
        if let Some(eco) = self.eco {
            status.eco = Some(eco);
        }
        if let Some(display) = self.display {
            status.display = Some(display);
        }
        if let Some(beep) = self.beep {
            status.beep = Some(beep);
        }
    }
}
