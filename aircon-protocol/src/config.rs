//! Client tuning and serde helpers for durations

use std::time::Duration;

use serde::Deserialize;

/// UDP port the unit listens on
pub const DEFAULT_PORT: u16 = 7777;

/// Configuration for [`AirconClient`](crate::AirconClient)
///
/// The retry and throttle constants were tuned against real units; keep them
/// configurable rather than baking them in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long to wait for a reply datagram
    /// Default: 3 seconds
    #[serde(with = "millis")]
    pub response_timeout: Duration,

    /// Retries after the first failed attempt (transport errors only)
    /// Default: 3
    pub max_retries: u32,

    /// Base retry delay; attempt `n` waits `n * retry_delay`
    /// Default: 500 ms
    #[serde(with = "millis")]
    pub retry_delay: Duration,

    /// Status throttle window before any command has succeeded
    /// Default: 1 second
    #[serde(with = "millis")]
    pub idle_throttle: Duration,

    /// Status throttle window once a command has succeeded
    /// Default: 2 seconds
    #[serde(with = "millis")]
    pub active_throttle: Duration,

    /// Capacity of the client event channel
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            idle_throttle: Duration::from_secs(1),
            active_throttle: Duration::from_secs(2),
            event_buffer_size: 64,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No retries and short timeouts, for tests and interactive probing
    pub fn fail_fast() -> Self {
        Self {
            response_timeout: Duration::from_millis(500),
            max_retries: 0,
            retry_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }
}

/// `Duration` as integer milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Duration` as integer seconds
pub mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.idle_throttle, Duration::from_secs(1));
        assert_eq!(config.active_throttle, Duration::from_secs(2));
    }

    #[test]
    fn test_fail_fast_keeps_throttle_defaults() {
        let config = ClientConfig::fail_fast();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.active_throttle, ClientConfig::default().active_throttle);
    }
}
