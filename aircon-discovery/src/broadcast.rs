//! Broadcast socket used by the probe
//!
//! Internal to the crate: sends one status query and yields raw replies until
//! the deadline passes.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use aircon_protocol::codec;

use crate::error::{DiscoveryError, Result};

pub(crate) struct BroadcastClient {
    socket: UdpSocket,
    timeout: Duration,
}

impl BroadcastClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e)))?;

        socket
            .set_broadcast(true)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to enable broadcast: {}", e)))?;

        Ok(Self { socket, timeout })
    }

    /// Send a status query to `target` and iterate over the replies
    pub fn query(&self, target: SocketAddr) -> Result<ReplyIterator<'_>> {
        let request = codec::build_status_request(1);
        self.socket
            .send_to(request.as_bytes(), target)
            .map_err(|e| DiscoveryError::NetworkError(format!("Failed to send probe: {}", e)))?;

        tracing::debug!("Sent status probe to {}", target);
        Ok(ReplyIterator {
            socket: &self.socket,
            deadline: Instant::now() + self.timeout,
            buffer: [0; 8192],
        })
    }
}

/// Raw `(sender, payload)` pairs received before the deadline
pub(crate) struct ReplyIterator<'a> {
    socket: &'a UdpSocket,
    deadline: Instant,
    buffer: [u8; 8192],
}

impl Iterator for ReplyIterator<'_> {
    type Item = (SocketAddr, String);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let remaining = self.deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() || self.socket.set_read_timeout(Some(remaining)).is_err() {
                return None;
            }

            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, from)) => match std::str::from_utf8(&self.buffer[..size]) {
                    Ok(text) => return Some((from, text.to_string())),
                    // Not one of ours, keep listening
                    Err(_) => continue,
                },
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Probe socket error: {}", e);
                    return None;
                }
            }
        }
    }
}
