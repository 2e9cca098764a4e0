//! Simulated units for tests.
//!
//! [`FakeUnit`] answers requests in memory and doubles as a [`Transport`];
//! [`UdpEmulator`] serves the same unit on a loopback UDP socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::codec;
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use crate::types::{DeviceOptions, RawDeviceStatus};

/// In-memory air conditioner.
///
/// Applies every `SetMessage` it receives to its status, so a later status
/// query reflects the change.
#[derive(Debug)]
pub struct FakeUnit {
    status: Mutex<RawDeviceStatus>,
    requests: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    failing: AtomicBool,
    malformed: AtomicBool,
    freeze: AtomicBool,
}

impl FakeUnit {
    pub fn new(status: RawDeviceStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            requests: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            failing: AtomicBool::new(false),
            malformed: AtomicBool::new(false),
            freeze: AtomicBool::new(false),
        })
    }

    /// Every exchange fails with a transport error while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every exchange returns garbage while set
    pub fn set_malformed(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    /// Acknowledge set messages without applying them while set
    pub fn set_frozen(&self, frozen: bool) {
        self.freeze.store(frozen, Ordering::SeqCst);
    }

    /// Delay before each reply
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn status(&self) -> RawDeviceStatus {
        self.status.lock().clone()
    }

    pub fn set_status(&self, status: RawDeviceStatus) {
        *self.status.lock() = status;
    }

    pub fn update_status(&self, update: impl FnOnce(&mut RawDeviceStatus)) {
        update(&mut self.status.lock());
    }

    /// All requests received so far, including failed ones
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn status_query_count(&self) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.contains("SyncStatusReq"))
            .count()
    }

    /// Option sets received, in order
    pub fn set_messages(&self) -> Vec<DeviceOptions> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| codec::parse_set_message(r).ok())
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Produce the reply to `request`, or `None` when the unit stays silent.
    pub fn respond(&self, request: &str) -> Option<String> {
        self.requests.lock().push(request.to_string());

        if self.malformed.load(Ordering::SeqCst) {
            return Some("garbage".to_string());
        }

        let seq = codec::parse_seq(request).ok().flatten().unwrap_or(0);
        if request.contains("SyncStatusReq") {
            return Some(codec::build_status_response(seq, &self.status.lock()));
        }

        let options = codec::parse_set_message(request).ok()?;
        if !self.freeze.load(Ordering::SeqCst) {
            options.apply_to(&mut self.status.lock());
        }
        Some(format!(
            r#"<msg msgid="SetMessage" type="Control" seq="{seq}"><SetMessage></SetMessage></msg>"#
        ))
    }
}

#[async_trait]
impl Transport for FakeUnit {
    async fn exchange(&self, request: &str) -> Result<String> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            self.requests.lock().push(request.to_string());
            return Err(ClientError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated transport failure",
            )));
        }

        self.respond(request)
            .ok_or(ClientError::Timeout(Duration::ZERO))
    }

    async fn close(&self) {}
}

/// A [`FakeUnit`] served over loopback UDP
pub struct UdpEmulator {
    addr: SocketAddr,
    unit: Arc<FakeUnit>,
    task: JoinHandle<()>,
}

impl UdpEmulator {
    pub async fn start(status: RawDeviceStatus) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let unit = FakeUnit::new(status);

        let task = tokio::spawn({
            let unit = Arc::clone(&unit);
            async move {
                let mut buffer = vec![0u8; 8192];
                while let Ok((n, peer)) = socket.recv_from(&mut buffer).await {
                    let request = String::from_utf8_lossy(&buffer[..n]).into_owned();
                    if unit.failing.load(Ordering::SeqCst) {
                        unit.requests.lock().push(request);
                        continue;
                    }
                    if let Some(reply) = unit.respond(&request) {
                        let _ = socket.send_to(reply.as_bytes(), peer).await;
                    }
                }
            }
        });

        Ok(Self { addr, unit, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn unit(&self) -> &Arc<FakeUnit> {
        &self.unit
    }
}

impl Drop for UdpEmulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
