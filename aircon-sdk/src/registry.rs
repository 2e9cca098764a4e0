//! Devices keyed by address, with explicit lifecycle

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DeviceConfig;
use crate::device::AirconDevice;
use crate::error::Result;

/// One [`AirconDevice`] per unit address.
///
/// Hosts share a registry between the components that need a unit, so each
/// unit gets a single poll loop and a single command queue however many
/// callers reach it.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<SocketAddr, Arc<AirconDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the device for `config.address()`, creating it on first use.
    ///
    /// An existing device keeps the configuration it was created with. A
    /// device that was cleaned up directly is replaced.
    pub fn get_or_create(&self, config: DeviceConfig) -> Result<Arc<AirconDevice>> {
        let address = config.address();
        let mut devices = self.devices.lock();
        if let Some(device) = devices.get(&address) {
            if !device.is_closed() {
                return Ok(Arc::clone(device));
            }
            tracing::debug!("Replacing closed unit {}", address);
        }

        let device = Arc::new(AirconDevice::new(config)?);
        devices.insert(address, Arc::clone(&device));
        tracing::debug!("Registered unit {}", address);
        Ok(device)
    }

    pub fn get(&self, address: &SocketAddr) -> Option<Arc<AirconDevice>> {
        self.devices.lock().get(address).cloned()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.devices.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Remove a device and clean it up. Returns whether it was registered.
    pub async fn dispose(&self, address: &SocketAddr) -> bool {
        let removed = self.devices.lock().remove(address);
        match removed {
            Some(device) => {
                device.cleanup().await;
                tracing::debug!("Disposed unit {}", address);
                true
            }
            None => false,
        }
    }

    /// Remove and clean up every device
    pub async fn dispose_all(&self) {
        let devices: Vec<_> = self.devices.lock().drain().map(|(_, device)| device).collect();
        for device in devices {
            device.cleanup().await;
        }
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.addresses())
            .finish()
    }
}
