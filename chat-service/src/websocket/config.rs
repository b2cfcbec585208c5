//! WebSocket configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Events buffered per connection before new ones are dropped for it
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Maximum message size in bytes (default: 64KB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,

    /// Maximum frame size in bytes (default: 16KB)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size_bytes: usize,

    /// Interval between server keepalive pings, in seconds (minimum 1)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl WebSocketConfig {
    /// Get the ping interval as a Duration
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Outbound buffer capacity, never zero
    #[must_use]
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_buffer.max(1)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            max_message_size_bytes: default_max_message_size(),
            max_frame_size_bytes: default_max_frame_size(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

const fn default_outbound_buffer() -> usize {
    64
}

const fn default_max_message_size() -> usize {
    65536 // 64KB
}

const fn default_max_frame_size() -> usize {
    16384 // 16KB
}

const fn default_ping_interval() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_websocket_config() {
        let config = WebSocketConfig::default();
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.max_message_size_bytes, 65536);
        assert_eq!(config.max_frame_size_bytes, 16384);
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = WebSocketConfig {
            outbound_buffer: 0,
            ping_interval_secs: 0,
            ..WebSocketConfig::default()
        };
        assert_eq!(config.outbound_capacity(), 1);
        assert_eq!(config.ping_interval(), Duration::from_secs(1));
    }
}
