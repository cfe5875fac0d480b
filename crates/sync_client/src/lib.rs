//! # Sync Client - Real-Time Room Synchronization
//!
//! The synchronization layer of the Tessera client. It owns the only parts
//! of the codebase with genuine concurrency and failure-recovery concerns;
//! rendering and input handling are thin consumers of its outputs.
//!
//! ## Architecture Overview
//!
//! * **Connection Manager** - one supervised WebSocket transport per room:
//!   handshake, heartbeat, staleness detection, exponential reconnect
//! * **Session Guard** - reference-counted lifecycle ensuring exactly one
//!   live connection per room across any number of consumers
//! * **Message Buffer** - ordered, id-deduplicated timeline of chat and
//!   synthesized room notifications
//! * **Room State Reconciler** - merges polled snapshots with push deltas
//!   under a timestamp rule and derives flags such as "can the host start"
//!
//! Events flow in one direction: the connection supervisor publishes every
//! inbound frame to the [`tessera_events`] dispatcher; the buffer and the
//! reconciler subscribe to the frame types they consume; the UI reads their
//! merged outputs through a [`SessionHandle`].
//!
//! ## Ordering and Cancellation
//!
//! Frames from a single transport are dispatched in FIFO arrival order; no
//! ordering is guaranteed across a reconnect boundary. A manual disconnect
//! flips one shutdown flag that every suspended operation selects on, so no
//! timer or task outlives its session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sync_client::{
//!     Credentials, HttpRoomDirectory, RoomCode, SessionGuard, SyncConfig, UserId, WsConnector,
//! };
//!
//! # async fn example() -> Result<(), sync_client::SyncError> {
//! let guard = SessionGuard::new(
//!     "ws://localhost:8080/ws",
//!     SyncConfig::default(),
//!     Arc::new(WsConnector),
//!     Arc::new(HttpRoomDirectory::new("http://localhost:8080")),
//! );
//!
//! let session = guard
//!     .acquire(
//!         RoomCode::new("BRAVO7"),
//!         Credentials {
//!             user_id: UserId::new(),
//!             username: "alice".into(),
//!             token: "session-token".into(),
//!         },
//!     )
//!     .await?;
//!
//! session.send_chat("hello room");
//! println!("players: {}", session.view().players.len());
//! # Ok(())
//! # }
//! ```

pub use buffer::{ChatMessage, MessageBuffer, MessageKind};
pub use config::SyncConfig;
pub use connection::{
    reconnect_delay, ConnectionManager, ConnectionState, ReconnectPlan, Transport,
    TransportConnector, TransportItem, WsConnector, NORMAL_CLOSE,
};
pub use error::SyncError;
pub use reconciler::{RoomReconciler, RoomView};
pub use session::{SessionGuard, SessionHandle};
pub use snapshot::{
    HttpRoomDirectory, PlayerProgress, PlayerStatus, RoomDetails, RoomDirectory, RoomSnapshot,
};
pub use types::{Credentials, RoomCode, UserId};

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod snapshot;
pub mod types;
