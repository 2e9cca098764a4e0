//! # aircon-sdk: local control of networked air conditioners
//!
//! Talks to units over their LAN UDP/XML protocol and keeps a canonical,
//! diffable state for each one:
//!
//! ```rust,no_run
//! use aircon_sdk::{DeviceConfig, DeviceRegistry, OperationMode, PowerState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aircon_sdk::SdkError> {
//!     let registry = DeviceRegistry::new();
//!     let device = registry.get_or_create(DeviceConfig::new([192, 168, 1, 40].into()))?;
//!
//!     // Cached read, refreshed when older than the poll interval
//!     let status = device.get_status().await;
//!     println!("{:?} at {:.1}°C", status.power, status.current_temperature);
//!
//!     // Describe the desired state; only the differences are sent
//!     let desired = device.device_state().clone();
//!     desired.set_power(PowerState::On);
//!     desired.set_mode(OperationMode::Cool);
//!     desired.set_target_temperature(22.0);
//!     device.apply_state_to_device(&desired).await?;
//!
//!     // React to confirmed and optimistic changes
//!     let mut changes = device.device_state().subscribe();
//!     if let Ok(change) = changes.recv().await {
//!         println!("{:?} -> {:?}", change.previous.power, change.current.power);
//!     }
//!
//!     registry.dispose_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! aircon-sdk (AirconDevice, CommandQueue, DeviceRegistry)
//!     ↓
//! aircon-state (DeviceState: canonical model, diffing, sleep debounce)
//!     ↓
//! aircon-protocol (AirconClient, codec, UDP transport)
//! ```
//!
//! Every write funnels through one [`CommandQueue`] per unit, so the unit
//! never sees two commands at once.

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod queue;
pub mod registry;

pub use config::{DeviceConfig, QueueConfig};
pub use device::{AirconDevice, PollHealth};
pub use error::{Result, SdkError};
pub use queue::{CommandId, CommandQueue, CommandSink, CommandTicket, PendingCommand, QueueEvent};
pub use registry::DeviceRegistry;

pub use aircon_discovery::{probe, probe_iter, DiscoveredUnit};
pub use aircon_protocol::{
    AirconClient, ClientConfig, ClientError, ClientEvent, DeviceOptions, FanSpeed, OperationMode,
    ProtocolError, RawDeviceStatus, DEFAULT_PORT,
};
pub use aircon_state::{
    ChangeSource, DeviceState, PartialDeviceState, PowerState, SleepMode, StateChange,
    StateConfig, StateSnapshot, SwingMode,
};
