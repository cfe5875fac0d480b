//! Connection lifecycle state machine and reconnect planning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle state of a room connection.
///
/// Exactly one value holds at any time; transitions are driven solely by the
/// connection supervisor. `Failed` and (post-teardown) `Disconnected` are
/// terminal — no timer fires once they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport; nothing scheduled.
    Disconnected,
    /// Dialing the server.
    Connecting,
    /// Transport open, credentials in flight.
    Authenticating,
    /// Handshake accepted; frames flowing.
    Connected,
    /// Abnormal closure observed; a retry is scheduled.
    Reconnecting,
    /// Retry budget exhausted; the session will not recover on its own.
    Failed,
}

impl ConnectionState {
    /// True while frames can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True once the machine has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// The pending retry while the machine sits in `Reconnecting`.
///
/// Exists only between an abnormal closure and the next dial; cleared on
/// success, exhaustion, and manual disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    /// 1-based attempt number for the upcoming dial.
    pub attempt: u32,
    /// Delay before that dial starts.
    pub next_delay: Duration,
}

/// Exponential backoff delay for reconnect attempt `attempt` (1-based):
/// `min(base * 2^attempt, cap)`.
pub fn reconnect_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(30);
        assert_eq!(reconnect_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(reconnect_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(reconnect_delay(3, base, cap), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(reconnect_delay(10, base, cap), cap);
        assert_eq!(reconnect_delay(u32::MAX, base, cap), cap);
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert!(ConnectionState::Connected.is_connected());
    }
}
