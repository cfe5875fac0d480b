//! Builders for the frames this client sends.
//!
//! Keeping frame construction in one place means the supervisor, the session
//! handle, and the tests all agree on payload shapes. Inbound payload shapes
//! live with their consumers (buffer, reconciler).

use crate::types::{Credentials, RoomCode, UserId};
use serde_json::json;
use tessera_events::{events, Frame};
use uuid::Uuid;

/// Handshake frame opening a room session.
pub fn authenticate(room: &RoomCode, credentials: &Credentials) -> Frame {
    Frame::new(
        "authenticate",
        json!({
            "room": room.as_str(),
            "user_id": credentials.user_id,
            "username": credentials.username,
            "token": credentials.token,
        }),
    )
}

/// Periodic liveness probe.
pub fn heartbeat() -> Frame {
    Frame::new(events::HEARTBEAT, json!({}))
}

/// User chat message; tagged with a fresh message id for deduplication.
pub fn chat(user_id: UserId, username: &str, text: &str) -> Frame {
    Frame::new(
        events::CHAT_MESSAGE,
        json!({
            "user_id": user_id,
            "username": username,
            "text": text,
        }),
    )
    .with_message_id(Uuid::new_v4().to_string())
}

/// Host request to start the game.
pub fn start_game(user_id: UserId) -> Frame {
    Frame::new("start_game", json!({ "user_id": user_id }))
}

/// Submission of a puzzle attempt.
pub fn attempt(user_id: UserId, payload: serde_json::Value) -> Frame {
    Frame::new(
        events::ATTEMPT_MADE,
        json!({
            "user_id": user_id,
            "attempt": payload,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_carries_credentials() {
        let creds = Credentials {
            user_id: UserId::new(),
            username: "alice".into(),
            token: "tok".into(),
        };
        let frame = authenticate(&RoomCode::new("abc123"), &creds);

        assert_eq!(frame.kind, "authenticate");
        assert_eq!(frame.data["room"], "ABC123");
        assert_eq!(frame.data["username"], "alice");
        assert_eq!(frame.data["token"], "tok");
    }

    #[test]
    fn chat_frames_get_unique_message_ids() {
        let user = UserId::new();
        let a = chat(user, "alice", "hello");
        let b = chat(user, "alice", "hello");
        assert!(a.message_id.is_some());
        assert_ne!(a.message_id, b.message_id);
    }
}
