//! Pull-based room snapshots.
//!
//! The surrounding system exposes two read-only endpoints — room details and
//! the player list — which the reconciler polls on a timer. This module owns
//! the response models and the [`RoomDirectory`] trait; nothing here ever
//! mutates room state.

use crate::error::SyncError;
use crate::types::{RoomCode, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Participation status of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// In the lobby, not yet playing.
    #[default]
    Waiting,
    /// Actively playing the current round.
    Playing,
    /// Finished the current round.
    Finished,
    /// Connection to this player was lost.
    Disconnected,
}

/// Per-player progress, subject to snapshot/delta merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    /// Identity of the player.
    pub user_id: UserId,
    /// Display name.
    #[serde(default)]
    pub username: Option<String>,
    /// Participation status.
    #[serde(default)]
    pub status: PlayerStatus,
    /// Accumulated score.
    #[serde(default)]
    pub score: i64,
    /// Whether the player has signalled readiness.
    #[serde(default)]
    pub ready: bool,
}

/// Room metadata from the details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetails {
    /// Short room code.
    pub code: RoomCode,
    /// User who owns the room and may start the game.
    pub host_id: UserId,
    /// Maximum number of participants.
    pub capacity: usize,
    /// Whether the game has started.
    #[serde(default)]
    pub started: bool,
}

/// One point-in-time read of room and player state.
///
/// Replaced wholesale on each poll; never mutated in place.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Room metadata.
    pub room: RoomDetails,
    /// Player list as reported by the server.
    pub players: Vec<PlayerProgress>,
    /// When the poll that produced this snapshot was initiated.
    ///
    /// Stamped at request initiation so that any push delta arriving while
    /// the request is in flight outranks the response.
    pub fetched_at: DateTime<Utc>,
}

/// Read-only snapshot source.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Fetches room metadata.
    async fn fetch_room(&self, room: &RoomCode) -> Result<RoomDetails, SyncError>;

    /// Fetches the player list.
    async fn fetch_players(&self, room: &RoomCode) -> Result<Vec<PlayerProgress>, SyncError>;
}

/// Production [`RoomDirectory`] over the HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRoomDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRoomDirectory {
    /// Creates a directory client rooted at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, SyncError> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Connection(format!("snapshot request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SyncError::Connection(format!("snapshot request rejected: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Protocol(format!("snapshot response malformed: {e}")))
    }
}

#[async_trait]
impl RoomDirectory for HttpRoomDirectory {
    async fn fetch_room(&self, room: &RoomCode) -> Result<RoomDetails, SyncError> {
        self.get_json(format!("{}/api/rooms/{}", self.base_url, room))
            .await
    }

    async fn fetch_players(&self, room: &RoomCode) -> Result<Vec<PlayerProgress>, SyncError> {
        self.get_json(format!("{}/api/rooms/{}/players", self.base_url, room))
            .await
    }
}
