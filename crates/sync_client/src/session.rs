//! Reference-counted session ownership.
//!
//! The [`SessionGuard`] is the single source of truth for "should this
//! session exist". Consumers acquire and release claims on a room; the first
//! claim builds the connection manager, buffer, and reconciler, and the last
//! release tears everything down exactly once. Only one room session exists
//! at a time — acquiring a different room replaces the current session
//! wholesale.

use crate::buffer::{ChatMessage, MessageBuffer};
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState, TransportConnector};
use crate::error::SyncError;
use crate::protocol;
use crate::reconciler::{RoomReconciler, RoomView};
use crate::snapshot::RoomDirectory;
use crate::types::{Credentials, RoomCode, UserId};
use std::sync::Arc;
use tessera_events::{create_dispatcher, EventDispatcher, Subscription};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

struct ActiveSession {
    room: RoomCode,
    refs: usize,
    credentials: Credentials,
    dispatcher: Arc<EventDispatcher>,
    manager: Arc<ConnectionManager>,
    reconciler: Arc<RoomReconciler>,
    buffer: Arc<MessageBuffer>,
    subscriptions: Vec<Subscription>,
}

impl ActiveSession {
    fn handle(&self) -> SessionHandle {
        SessionHandle {
            room: self.room.clone(),
            user_id: self.credentials.user_id,
            username: self.credentials.username.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            manager: Arc::clone(&self.manager),
            reconciler: Arc::clone(&self.reconciler),
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Builds sessions on first acquisition and destroys them on last release.
pub struct SessionGuard {
    server_url: String,
    config: SyncConfig,
    connector: Arc<dyn TransportConnector>,
    directory: Arc<dyn RoomDirectory>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionGuard {
    /// Creates a guard; no connection exists until the first `acquire`.
    pub fn new(
        server_url: impl Into<String>,
        config: SyncConfig,
        connector: Arc<dyn TransportConnector>,
        directory: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            config,
            connector,
            directory,
            active: Mutex::new(None),
        }
    }

    /// Claims the session for `room`, creating it if necessary.
    ///
    /// Repeat acquisitions for the same room — including while the first
    /// handshake is still in flight — only bump the reference count; exactly
    /// one transport connection exists per room at any instant. Acquiring a
    /// *different* room fully tears down the current session first.
    /// Credentials are used only when this call creates the session.
    pub async fn acquire(
        &self,
        room: RoomCode,
        credentials: Credentials,
    ) -> Result<SessionHandle, SyncError> {
        let mut active = self.active.lock().await;

        if let Some(session) = active.as_mut() {
            if session.room == room {
                session.refs += 1;
                debug!("room {}: ref count now {}", room, session.refs);
                return Ok(session.handle());
            }
            info!("switching rooms {} -> {}", session.room, room);
            if let Some(old) = active.take() {
                teardown(old).await;
            }
        }

        let dispatcher = create_dispatcher();
        let buffer = Arc::new(MessageBuffer::new(self.config.buffer_capacity));
        let reconciler = Arc::new(RoomReconciler::new(
            room.clone(),
            credentials.user_id,
            Arc::clone(&self.directory),
            self.config.poll_interval,
        ));
        let mut subscriptions = Arc::clone(&buffer).attach(&dispatcher);
        subscriptions.extend(Arc::clone(&reconciler).attach(&dispatcher));

        let manager = Arc::new(ConnectionManager::new(
            room.clone(),
            credentials.clone(),
            self.server_url.clone(),
            self.config.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&self.connector),
        ));

        // Failure here leaves no session behind; the subscriptions above are
        // dropped with the partially built pieces.
        manager.connect().await?;
        Arc::clone(&reconciler).start_polling().await;

        let session = ActiveSession {
            room: room.clone(),
            refs: 1,
            credentials,
            dispatcher,
            manager,
            reconciler,
            buffer,
            subscriptions,
        };
        let handle = session.handle();
        *active = Some(session);
        info!("room {}: session created", room);
        Ok(handle)
    }

    /// Releases one claim on `room`.
    ///
    /// When the count reaches zero the session is torn down exactly once:
    /// transport disconnected, poll loop cancelled, internal subscriptions
    /// disposed. Releasing an unknown room is a logged no-op.
    pub async fn release(&self, room: &RoomCode) {
        let mut active = self.active.lock().await;

        let tear = match active.as_mut() {
            Some(session) if session.room == *room => {
                session.refs = session.refs.saturating_sub(1);
                debug!("room {}: ref count now {}", room, session.refs);
                session.refs == 0
            }
            Some(session) => {
                warn!(
                    "release for room {} ignored; active session is {}",
                    room, session.room
                );
                false
            }
            None => {
                warn!("release for room {} ignored; no active session", room);
                false
            }
        };

        if tear {
            if let Some(old) = active.take() {
                teardown(old).await;
            }
        }
    }

    /// Tears the active session down regardless of its reference count.
    ///
    /// Intended for process shutdown where consumers will not release
    /// individually.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(old) = active.take() {
            teardown(old).await;
        }
    }

    /// Current reference count for `room` (0 when no session exists).
    pub async fn ref_count(&self, room: &RoomCode) -> usize {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(session) if session.room == *room => session.refs,
            _ => 0,
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

async fn teardown(session: ActiveSession) {
    debug!("room {}: tearing down session", session.room);
    session.manager.disconnect().await;
    session.reconciler.stop().await;
    // Dropping the subscriptions detaches the buffer and reconciler from
    // the dispatcher.
    drop(session.subscriptions);
    info!("room {}: session torn down", session.room);
}

/// A consumer's claim on a session.
///
/// Cloneable and cheap; all clones observe the same underlying session.
/// Dropping a handle does NOT release the claim — call
/// [`SessionGuard::release`] explicitly, so lifecycle stays with the guard.
#[derive(Clone)]
pub struct SessionHandle {
    room: RoomCode,
    user_id: UserId,
    username: String,
    dispatcher: Arc<EventDispatcher>,
    manager: Arc<ConnectionManager>,
    reconciler: Arc<RoomReconciler>,
    buffer: Arc<MessageBuffer>,
}

impl SessionHandle {
    /// Room this handle is bound to.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// Identity this session authenticated as.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Dispatcher for consumers that want raw frame subscriptions.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Watch channel following connection state transitions.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    /// Merged room view with fresh derived flags.
    pub fn view(&self) -> RoomView {
        self.reconciler.view()
    }

    /// Current message timeline, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.buffer.messages()
    }

    /// Sends a chat message; best effort.
    pub fn send_chat(&self, text: &str) -> bool {
        self.manager
            .send(protocol::chat(self.user_id, &self.username, text))
    }

    /// Submits a puzzle attempt; best effort.
    pub fn send_attempt(&self, payload: serde_json::Value) -> bool {
        self.manager.send(protocol::attempt(self.user_id, payload))
    }

    /// Asks the server to start the game; best effort.
    pub fn request_start(&self) -> bool {
        self.manager.send(protocol::start_game(self.user_id))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("room", &self.room)
            .field("user_id", &self.user_id)
            .field("state", &self.connection_state())
            .finish()
    }
}
