//! Broadcast probe for air-conditioning units
//!
//! Sends a single status query to the LAN broadcast address and collects
//! every unit that answers with a status reply. There is no discovery
//! protocol beyond that: units are identified by IP address, with the name
//! and firmware version they report when available.
//!
//! # Quick Start
//!
//! ```no_run
//! use aircon_discovery::probe;
//! use std::time::Duration;
//!
//! for unit in probe(Duration::from_secs(3)) {
//!     println!("Found {:?} at {}", unit.name, unit.ip);
//! }
//! ```

mod broadcast;
mod error;
mod probe;

pub use error::{DiscoveryError, Result};
pub use probe::ProbeIterator;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use aircon_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Default time to wait for replies
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// A unit that answered the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUnit {
    pub ip: IpAddr,
    /// `DeviceName` from the unit's status, if reported
    pub name: Option<String>,
    /// `WifiVer` from the unit's status, if reported
    pub wifi_version: Option<String>,
}

/// Probe the local broadcast address and collect every unit that answers.
pub fn probe(timeout: Duration) -> Vec<DiscoveredUnit> {
    probe_iter(timeout).collect()
}

/// Probe the local broadcast address, yielding units as they are decoded.
///
/// Socket setup failures yield an empty iterator.
pub fn probe_iter(timeout: Duration) -> ProbeIterator {
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, DEFAULT_PORT));
    ProbeIterator::new(target, timeout).unwrap_or_else(|e| {
        tracing::warn!("Could not start probe: {}", e);
        ProbeIterator::empty(target)
    })
}

/// Probe a specific address, such as a subnet broadcast or a single unit.
pub fn probe_address(target: SocketAddr, timeout: Duration) -> Result<ProbeIterator> {
    ProbeIterator::new(target, timeout)
}
