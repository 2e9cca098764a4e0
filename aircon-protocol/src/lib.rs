//! Wire protocol for LAN-controlled air-conditioning units
//!
//! Units listen on UDP port 7777 and speak small XML envelopes: a status
//! query (`SyncStatusReq`) answered by a `statusUpdateMsg`, and `SetMessage`
//! commands carrying one or more option tags.
//!
//! This crate provides:
//!
//! - [`codec`]: builders and parsers for every message
//! - [`Transport`]: one datagram out, one datagram back, with [`UdpTransport`]
//!   as the production implementation
//! - [`AirconClient`]: throttled status reads, retried commands, and an
//!   optimistic status cache
//!
//! # Example
//!
//! ```rust,no_run
//! use aircon_protocol::{AirconClient, ClientConfig, FanSpeed, DEFAULT_PORT};
//!
//! # async fn run() -> aircon_protocol::Result<()> {
//! let client = AirconClient::new(([192, 168, 1, 40], DEFAULT_PORT).into(), ClientConfig::default());
//! client.set_fan_and_sleep(FanSpeed::Low, true).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::{AirconClient, ClientEvent};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{ClientError, ProtocolError, Result};
pub use transport::{Transport, UdpTransport};
pub use types::{
    DeviceOptions, FanSpeed, OperationMode, RawDeviceStatus, SleepReading, SLEEP_OFF_TOKEN,
    SLEEP_ON_TOKEN,
};
