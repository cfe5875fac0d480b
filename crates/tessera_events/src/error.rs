//! Error types for event dispatch and payload decoding.

/// Errors surfaced by event handlers and payload decoding.
///
/// Handler errors never propagate to the publisher; the dispatcher logs them
/// and continues with the remaining handlers. The variants exist so handlers
/// can report *why* they failed in a structured way.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The frame payload did not match the shape the handler expected.
    #[error("malformed payload for '{event}': {reason}")]
    Payload {
        /// Frame type the handler was subscribed to.
        event: String,
        /// Decoding failure detail.
        reason: String,
    },

    /// The handler ran but could not complete its work.
    #[error("handler failed: {0}")]
    Handler(String),
}

impl EventError {
    /// Builds a payload error from a serde failure.
    pub fn payload(event: &str, err: serde_json::Error) -> Self {
        Self::Payload {
            event: event.to_string(),
            reason: err.to_string(),
        }
    }
}
