//! Canonical device state for aircon-sdk
//!
//! The unit reports Fahrenheit temperatures, on/off flags and profile
//! tokens. [`DeviceState`] keeps the canonical form of those settings
//! (Celsius, enums) and reconciles it with both what the unit reports and
//! what the user asked for.
//!
//! # Architecture
//!
//! ```text
//! RawDeviceStatus ──update_from_device──┐
//!                                       ├──> DeviceState ──> StateChange subscribers
//! PartialDeviceState ─update_from_options┘        │
//!                                                 └──diff(desired)──> PartialDeviceState ──> DeviceOptions
//! ```

pub mod config;
pub mod model;
pub mod state;
pub mod units;

pub use config::StateConfig;
pub use model::{
    ChangeSource, PartialDeviceState, PowerState, SleepMode, StateChange, StateSnapshot,
    SwingMode,
};
pub use state::DeviceState;

// Re-export the wire enums shared with the canonical model
pub use aircon_protocol::{FanSpeed, OperationMode};
