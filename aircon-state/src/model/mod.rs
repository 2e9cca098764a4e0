//! Model types for aircon-state

mod modes;
mod partial;
mod snapshot;
mod state_change;

pub use modes::{PowerState, SleepMode, SwingMode};
pub use partial::PartialDeviceState;
pub use snapshot::StateSnapshot;
pub use state_change::{ChangeSource, StateChange};
