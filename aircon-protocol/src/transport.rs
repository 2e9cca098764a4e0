//! Request/response exchange over UDP

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::codec;
use crate::error::{ClientError, ProtocolError, Result};

/// Largest datagram the unit is known to send, with headroom
const RECV_BUFFER_SIZE: usize = 8192;

/// One request datagram out, its response datagram back.
///
/// The client drives all device traffic through this trait so that tests can
/// substitute an in-memory device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the device's reply.
    async fn exchange(&self, request: &str) -> Result<String>;

    /// Release any socket held by the transport. Idempotent.
    async fn close(&self);
}

/// Production transport: a UDP socket connected to the unit.
///
/// The socket is bound lazily on the first exchange, dropped after any
/// socket-level error so the next exchange starts clean, and released for
/// good on [`close`](Transport::close).
#[derive(Debug)]
pub struct UdpTransport {
    device: SocketAddr,
    response_timeout: Duration,
    socket: Mutex<Option<UdpSocket>>,
    closed: AtomicBool,
}

impl UdpTransport {
    pub fn new(device: SocketAddr, response_timeout: Duration) -> Self {
        Self {
            device,
            response_timeout,
            socket: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> SocketAddr {
        self.device
    }

    async fn bind(&self) -> std::io::Result<UdpSocket> {
        let local: SocketAddr = if self.device.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.device).await?;
        tracing::debug!("Bound {} for device {}", socket.local_addr()?, self.device);
        Ok(socket)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn exchange(&self, request: &str) -> Result<String> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }

        // Holding the lock across the round trip keeps replies paired with requests
        let mut slot = self.socket.lock().await;
        // Only a socket that completed its exchange goes back into the slot
        let socket = match slot.take() {
            Some(socket) => socket,
            None => self.bind().await?,
        };

        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        // Discard late replies to earlier requests that timed out
        while let Ok(stale) = socket.try_recv(&mut buffer) {
            tracing::trace!("Discarded {} stale bytes from {}", stale, self.device);
        }

        let expected_seq = codec::parse_seq(request).ok().flatten();
        socket.send(request.as_bytes()).await?;

        let deadline = Instant::now() + self.response_timeout;
        loop {
            let received = match tokio::time::timeout_at(deadline, socket.recv(&mut buffer)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    *slot = Some(socket);
                    return Err(ClientError::Timeout(self.response_timeout));
                }
            };

            let reply = match std::str::from_utf8(&buffer[..received]) {
                Ok(reply) => reply,
                Err(_) => {
                    *slot = Some(socket);
                    return Err(ProtocolError::MalformedXml(
                        "response is not valid UTF-8".to_string(),
                    )
                    .into());
                }
            };

            // A reply carrying another request's seq arrived after that request gave up
            if let (Some(expected), Ok(Some(seq))) = (expected_seq, codec::parse_seq(reply)) {
                if seq != expected {
                    tracing::debug!(
                        "Skipping reply seq {} from {} while waiting for seq {}",
                        seq,
                        self.device,
                        expected
                    );
                    continue;
                }
            }

            let reply = reply.to_string();
            *slot = Some(socket);
            return Ok(reply);
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if self.socket.lock().await.take().is_some() {
            tracing::debug!("Released socket for device {}", self.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_device() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..n], peer).await;
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let (addr, device) = echo_device().await;
        let transport = UdpTransport::new(addr, Duration::from_secs(2));

        let reply = transport.exchange("<msg>ping</msg>").await.unwrap();
        assert_eq!(reply, "<msg>ping</msg>");

        transport.close().await;
        device.abort();
    }

    #[tokio::test]
    async fn test_timeout_when_device_silent() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(silent.local_addr().unwrap(), Duration::from_millis(100));

        let result = transport.exchange("<msg/>").await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_exchange() {
        let (addr, device) = echo_device().await;
        let transport = UdpTransport::new(addr, Duration::from_secs(1));

        transport.close().await;
        transport.close().await;

        assert!(matches!(transport.exchange("<msg/>").await, Err(ClientError::Closed)));
        device.abort();
    }
}
