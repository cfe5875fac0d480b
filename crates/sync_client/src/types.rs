//! Core identifier and credential types for the synchronization layer.
//!
//! Wrapper types keep user ids and room codes from being confused with each
//! other or with arbitrary strings; both serialize transparently for the
//! wire protocol and the snapshot API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user.
///
/// A thin wrapper around UUID so user ids cannot be mixed up with room codes
/// or message ids at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Creates a new random user id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short human-facing code identifying a room (e.g. `"BRAVO7"`).
///
/// Codes are compared case-insensitively by normalizing to uppercase on
/// construction, matching how players type them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes and wraps a raw room code.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// The normalized code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Credentials presented during the connection handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Identity of the connecting user.
    pub user_id: UserId,
    /// Display name shown to other players.
    pub username: String,
    /// Opaque session token issued by the surrounding system.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_normalize_case_and_whitespace() {
        assert_eq!(RoomCode::new(" bravo7 "), RoomCode::new("BRAVO7"));
        assert_eq!(RoomCode::new("abc123").as_str(), "ABC123");
    }

    #[test]
    fn user_ids_parse_and_display() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
