//! Tuning parameters for the synchronization layer.
//!
//! All timings are plain [`Duration`]s so tests can shrink them to
//! milliseconds; the binary crate maps its TOML settings onto this struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_stale_after() -> Duration {
    // Three missed heartbeat windows before the link is declared dead.
    Duration::from_secs(45)
}

fn default_reconnect_base() -> Duration {
    Duration::from_secs(1)
}

fn default_reconnect_cap() -> Duration {
    Duration::from_secs(30)
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_buffer_capacity() -> usize {
    500
}

/// Configuration for one room session.
///
/// The defaults match production behavior; integration tests override the
/// timings with millisecond values to keep the suite fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Bound on dial + authentication handshake, end to end.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Interval between outbound liveness probes while Connected.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Inbound silence beyond this threshold marks the connection dead.
    #[serde(default = "default_stale_after")]
    pub stale_after: Duration,

    /// Base delay for the exponential reconnect backoff.
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base: Duration,

    /// Ceiling for the reconnect backoff delay.
    #[serde(default = "default_reconnect_cap")]
    pub reconnect_cap: Duration,

    /// Reconnect attempts before giving up in terminal Failed state.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Interval between room snapshot polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Retained chat/notification messages; oldest dropped on overflow.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
            stale_after: default_stale_after(),
            reconnect_base: default_reconnect_base(),
            reconnect_cap: default_reconnect_cap(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            poll_interval: default_poll_interval(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SyncConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert!(config.stale_after > config.heartbeat_interval);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.buffer_capacity, 500);
        assert!(config.reconnect_cap >= config.reconnect_base);
    }
}
