//! Error taxonomy for the synchronization layer.
//!
//! Transport, authentication, and timeout failures surface to consumers as
//! connection-state transitions plus human-readable `error` events; the
//! typed values here are returned only from `connect()` and the snapshot
//! API, never thrown across the public contract from background tasks.

use std::time::Duration;

/// Failures the synchronization layer can report.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The transport could not be established or died unexpectedly.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the handshake credentials.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Connect or handshake exceeded its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A frame or snapshot response had an unrecognized shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A send was attempted while the connection was not usable.
    #[error("send failed: {0}")]
    Send(String),
}

impl SyncError {
    /// True for failures that the reconnect policy should retry.
    ///
    /// Authentication rejections are not retried: the server made a
    /// deliberate decision and re-dialing with the same credentials would
    /// spin forever.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Authentication(_))
    }
}
