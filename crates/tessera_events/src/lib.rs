//! # Tessera Event System
//!
//! Typed publish/subscribe infrastructure for the Tessera client. Every
//! component of the synchronization layer communicates through one
//! [`EventDispatcher`]: the connection supervisor publishes inbound wire
//! frames, and any number of independent consumers (chat buffer, room state
//! reconciler, UI adapters) subscribe to the frame types they care about.
//!
//! ## Design Principles
//!
//! - **Type Safety**: subscriptions can deserialize frame payloads into
//!   strongly typed structs before the handler runs
//! - **Isolation**: a failing handler is logged and skipped; it never stops
//!   delivery to the remaining handlers and never reaches the publisher
//! - **Determinism**: handlers run synchronously, in registration order,
//!   against a snapshot of the subscriber list taken when the publish starts
//!
//! ## Example
//!
//! ```rust
//! use tessera_events::{create_dispatcher, Frame};
//!
//! let dispatcher = create_dispatcher();
//! let _sub = dispatcher.subscribe("chat_message", |frame: &Frame| {
//!     println!("chat payload: {}", frame.data);
//!     Ok(())
//! });
//!
//! dispatcher.publish(&Frame::new("chat_message", serde_json::json!({ "text": "hi" })));
//! ```

pub use dispatcher::{DispatcherStats, EventDispatcher, Subscription};
pub use error::EventError;
pub use frame::{current_timestamp_ms, Frame};

pub mod dispatcher;
pub mod error;
pub mod frame;

/// Well-known frame types exchanged with the game server.
///
/// The wire protocol routes every frame by its `type` string; these constants
/// keep publishers and subscribers in agreement without scattering literals.
pub mod events {
    /// Server acknowledged the transport connection.
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    /// Credentials accepted during the handshake.
    pub const AUTHENTICATION_SUCCESS: &str = "authentication_success";
    /// Credentials rejected during the handshake.
    pub const AUTHENTICATION_FAILED: &str = "authentication_failed";
    /// Chat message from a single user.
    pub const CHAT_MESSAGE: &str = "chat_message";
    /// Chat message fanned out to the whole room.
    pub const CHAT_BROADCAST: &str = "chat_broadcast";
    /// A player entered the room.
    pub const PLAYER_JOINED: &str = "player_joined";
    /// A player left the room.
    pub const PLAYER_LEFT: &str = "player_left";
    /// The host started the game.
    pub const GAME_STARTED: &str = "game_started";
    /// A player submitted an attempt.
    pub const ATTEMPT_MADE: &str = "attempt_made";
    /// Full room state pushed by the server.
    pub const ROOM_STATE: &str = "room_state";
    /// Liveness probe (either direction).
    pub const HEARTBEAT: &str = "heartbeat";
    /// Application-level ping.
    pub const PING: &str = "ping";
    /// Application-level pong.
    pub const PONG: &str = "pong";
    /// Connection-level or server-reported failure.
    pub const ERROR: &str = "error";
}

use std::sync::Arc;

/// Creates a new event dispatcher ready for subscriptions.
///
/// The dispatcher is always handled through an `Arc` so that subscriptions
/// can hold a weak reference back to it for disposal.
pub fn create_dispatcher() -> Arc<EventDispatcher> {
    Arc::new(EventDispatcher::new())
}
