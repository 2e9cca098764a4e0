//! Configuration for devices and their command queues

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use aircon_discovery::DiscoveredUnit;
use aircon_protocol::config::{millis, secs};
use aircon_protocol::{ClientConfig, DEFAULT_PORT};
use aircon_state::StateConfig;
use serde::Deserialize;

use crate::error::{Result, SdkError};

/// Configuration for a [`CommandQueue`](crate::CommandQueue)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Gap between one command's completion and the next one's start
    /// Default: 500 ms
    #[serde(with = "millis")]
    pub min_command_delay: Duration,

    /// Queue-level retries after the first failed attempt
    /// Default: 3
    pub max_retries: u32,

    /// Delay between queue-level attempts
    /// Default: 1 second
    #[serde(with = "millis")]
    pub retry_delay: Duration,

    /// Capacity of the queue event channel
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_command_delay: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            event_buffer_size: 64,
        }
    }
}

/// Configuration for one [`AirconDevice`](crate::AirconDevice)
///
/// # Examples
///
/// ```rust
/// use aircon_sdk::DeviceConfig;
/// use std::time::Duration;
///
/// let config = DeviceConfig::new([192, 168, 1, 40].into())
///     .with_poll_interval(Duration::from_secs(15))
///     .with_min_command_delay(Duration::from_millis(750));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Address of the unit
    pub ip: IpAddr,

    /// UDP port of the unit
    /// Default: 7777
    pub port: u16,

    /// Background poll interval, also the freshness TTL of cached state
    /// Default: 30 seconds
    #[serde(with = "secs")]
    pub poll_interval: Duration,

    /// Delay before the confirmation poll that follows an accepted command
    /// Default: 2 seconds
    #[serde(with = "millis")]
    pub quick_refresh_delay: Duration,

    /// Consecutive poll failures before polling slows down
    /// Default: 3
    pub failure_threshold: u32,

    /// Poll interval multiplier while degraded
    /// Default: 3
    pub degraded_multiplier: u32,

    pub queue: QueueConfig,
    pub client: ClientConfig,
    pub state: StateConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_interval: Duration::from_secs(30),
            quick_refresh_delay: Duration::from_secs(2),
            failure_threshold: 3,
            degraded_multiplier: 3,
            queue: QueueConfig::default(),
            client: ClientConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            ..Default::default()
        }
    }

    /// Config for a unit found by the broadcast probe
    pub fn from_discovered(unit: &DiscoveredUnit) -> Self {
        Self::new(unit.ip)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_min_command_delay(mut self, delay: Duration) -> Self {
        self.queue.min_command_delay = delay;
        self
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Poll interval once `failure_threshold` consecutive polls have failed
    pub fn degraded_interval(&self) -> Duration {
        self.poll_interval * self.degraded_multiplier
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.is_unspecified() {
            return Err(SdkError::InvalidConfig("device IP address is not set".to_string()));
        }
        if self.port == 0 {
            return Err(SdkError::InvalidConfig("port must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(SdkError::InvalidConfig("poll_interval must be non-zero".to_string()));
        }
        if self.failure_threshold == 0 || self.degraded_multiplier == 0 {
            return Err(SdkError::InvalidConfig(
                "failure_threshold and degraded_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::new([10, 0, 0, 5].into());
        assert_eq!(config.address(), "10.0.0.5:7777".parse().unwrap());
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.degraded_interval(), Duration::from_secs(90));
        assert_eq!(config.queue.min_command_delay, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(DeviceConfig::default())]
    #[case(DeviceConfig::new([10, 0, 0, 5].into()).with_poll_interval(Duration::ZERO))]
    #[case(DeviceConfig::new([10, 0, 0, 5].into()).with_port(0))]
    #[case(DeviceConfig { degraded_multiplier: 0, ..DeviceConfig::new([10, 0, 0, 5].into()) })]
    fn test_invalid_configs(#[case] config: DeviceConfig) {
        assert!(matches!(config.validate(), Err(SdkError::InvalidConfig(_))));
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{
                "ip": "192.168.1.40",
                "poll_interval": 10,
                "queue": { "min_command_delay": 800 },
                "client": { "max_retries": 5 },
                "state": { "sleep_debounce": 4000 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.ip, IpAddr::from([192, 168, 1, 40]));
        assert_eq!(config.port, 7777);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.queue.min_command_delay, Duration::from_millis(800));
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.client.max_retries, 5);
        assert_eq!(config.state.sleep_debounce, Duration::from_secs(4));
    }
}
