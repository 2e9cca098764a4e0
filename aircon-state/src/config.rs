//! Tuning for [`DeviceState`](crate::DeviceState)

use std::time::Duration;

use aircon_protocol::config::millis;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Window after a local sleep-on command during which a reported "off"
    /// profile is treated as a transient echo
    /// Default: 5 seconds
    #[serde(with = "millis")]
    pub sleep_debounce: Duration,

    /// Capacity of the change notification channel
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            sleep_debounce: Duration::from_secs(5),
            event_buffer_size: 64,
        }
    }
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sleep_debounce(mut self, window: Duration) -> Self {
        self.sleep_debounce = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_config() {
        let config: StateConfig = serde_json::from_str(r#"{"sleep_debounce": 3000}"#).unwrap();
        assert_eq!(config.sleep_debounce, Duration::from_secs(3));
        assert_eq!(config.event_buffer_size, 64);
    }
}
