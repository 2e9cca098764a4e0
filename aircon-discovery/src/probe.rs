//! Probe iterator: replies decoded, filtered and deduplicated

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use aircon_protocol::codec;

use crate::broadcast::BroadcastClient;
use crate::error::Result;
use crate::DiscoveredUnit;

/// Iterator over units answering a status probe.
///
/// Replies are collected on the first call to `next`, until the timeout
/// elapses. Anything that is not a well-formed status reply is skipped, and
/// each IP address is yielded at most once.
///
/// # Examples
///
/// ```no_run
/// use aircon_discovery::probe_iter;
/// use std::time::Duration;
///
/// for unit in probe_iter(Duration::from_secs(2)) {
///     println!("{} ({:?})", unit.ip, unit.name);
/// }
/// ```
pub struct ProbeIterator {
    client: Option<BroadcastClient>,
    target: SocketAddr,
    replies: Vec<(SocketAddr, String)>,
    index: usize,
    seen: HashSet<IpAddr>,
}

impl ProbeIterator {
    pub(crate) fn new(target: SocketAddr, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Some(BroadcastClient::new(timeout)?),
            target,
            replies: Vec::new(),
            index: 0,
            seen: HashSet::new(),
        })
    }

    /// An iterator that yields nothing, used when the socket cannot be set up
    pub(crate) fn empty(target: SocketAddr) -> Self {
        Self {
            client: None,
            target,
            replies: Vec::new(),
            index: 0,
            seen: HashSet::new(),
        }
    }

    fn fill_buffer(&mut self) {
        if let Some(client) = self.client.take() {
            match client.query(self.target) {
                Ok(replies) => self.replies.extend(replies),
                Err(e) => tracing::warn!("Probe failed: {}", e),
            }
        }
    }
}

impl Iterator for ProbeIterator {
    type Item = DiscoveredUnit;

    fn next(&mut self) -> Option<Self::Item> {
        if self.client.is_some() {
            self.fill_buffer();
        }

        while let Some((from, payload)) = self.replies.get(self.index) {
            self.index += 1;

            if self.seen.contains(&from.ip()) {
                continue;
            }

            let status = match codec::parse_status(payload) {
                Ok(status) => status,
                Err(e) => {
                    tracing::debug!("Ignoring reply from {}: {}", from, e);
                    continue;
                }
            };

            self.seen.insert(from.ip());
            return Some(DiscoveredUnit {
                ip: from.ip(),
                name: status.device_name,
                wifi_version: status.wifi_version,
            });
        }

        None
    }
}
