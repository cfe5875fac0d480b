//! The connection supervisor: handshake, heartbeat, reconnect policy.
//!
//! One [`ConnectionManager`] owns one room's transport for the lifetime of a
//! session. All inbound frames are forwarded verbatim to the event
//! dispatcher; no business logic happens here. Consumers observe the
//! connection only through the dispatcher and the state watch channel — the
//! transport handle itself never leaves the supervisor task.

use crate::config::SyncConfig;
use crate::connection::state::{reconnect_delay, ConnectionState, ReconnectPlan};
use crate::connection::transport::{Transport, TransportConnector, TransportItem, NORMAL_CLOSE};
use crate::error::SyncError;
use crate::protocol;
use crate::types::{Credentials, RoomCode};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tessera_events::{events, EventDispatcher, Frame};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns the persistent connection for one room.
///
/// `connect` establishes the transport and authentication handshake under a
/// bounded timeout, then hands the transport to a background supervisor task
/// that drives the read loop, heartbeat, and reconnect policy until
/// `disconnect` or terminal failure.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    room: RoomCode,
    credentials: Credentials,
    url: String,
    config: SyncConfig,
    dispatcher: Arc<EventDispatcher>,
    connector: Arc<dyn TransportConnector>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    outbound_tx: StdMutex<mpsc::UnboundedSender<Frame>>,
    attempts: AtomicU32,
    plan: StdMutex<Option<ReconnectPlan>>,
}

enum Exit {
    /// Manual disconnect requested; no retry.
    Shutdown,
    /// Voluntary close from the peer; no retry.
    Normal,
    /// Anything else; feeds the reconnect policy.
    Abnormal(String),
}

impl ConnectionManager {
    /// Creates a manager for `room`; nothing is dialed until [`connect`].
    ///
    /// [`connect`]: ConnectionManager::connect
    pub fn new(
        room: RoomCode,
        credentials: Credentials,
        url: impl Into<String>,
        config: SyncConfig,
        dispatcher: Arc<EventDispatcher>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        // Replaced with a live channel on every connect; this placeholder
        // keeps `send` total before the first connect.
        let (outbound_tx, _) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                room,
                credentials,
                url: url.into(),
                config,
                dispatcher,
                connector,
                state_tx,
                shutdown_tx,
                outbound_tx: StdMutex::new(outbound_tx),
                attempts: AtomicU32::new(0),
                plan: StdMutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Dials the server and runs the authentication handshake.
    ///
    /// Resolves once the state machine reaches `Connected`, or rejects with
    /// the typed failure (`Connection`, `Authentication`, `Timeout`). The
    /// whole exchange is bounded by `config.connect_timeout`. Calling while
    /// already connecting or connected is a no-op.
    pub async fn connect(&self) -> Result<(), SyncError> {
        if !self.state().is_terminal() {
            debug!("connect ignored; already {}", self.state());
            return Ok(());
        }

        self.shared.shutdown_tx.send_replace(false);
        self.shared.attempts.store(0, Ordering::SeqCst);

        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        let result = tokio::select! {
            r = establish(&self.shared) => r,
            _ = shutdown_requested(&mut shutdown_rx) => {
                Err(SyncError::Connection("connect cancelled".into()))
            }
        };

        let transport = match result {
            Ok(t) => t,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                self.shared.publish_error(format!("connect failed: {e}"));
                return Err(e);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound_tx.lock().expect("outbound lock poisoned") = outbound_tx;

        self.shared.enter_connected();

        let handle = tokio::spawn(run_supervisor(
            Arc::clone(&self.shared),
            transport,
            outbound_rx,
        ));
        *self.supervisor.lock().await = Some(handle);
        Ok(())
    }

    /// Queues a frame for delivery; best effort.
    ///
    /// Never suspends. Returns `false` without queuing when the connection
    /// is not in `Connected` state.
    pub fn send(&self, frame: Frame) -> bool {
        if !self.state().is_connected() {
            return false;
        }
        self.shared
            .outbound_tx
            .lock()
            .expect("outbound lock poisoned")
            .send(frame)
            .is_ok()
    }

    /// Tears the connection down; idempotent and reachable from any state.
    ///
    /// Cancels the heartbeat, any pending reconnect delay, and an in-flight
    /// handshake as one operation; no timer outlives this call.
    pub async fn disconnect(&self) {
        self.shared.shutdown_tx.send_replace(true);
        let handle = self.supervisor.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.shared.clear_plan();
        self.shared.set_state(ConnectionState::Disconnected);
        debug!("disconnected from room {}", self.shared.room);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch channel following every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The pending retry, if the machine is currently `Reconnecting`.
    pub fn reconnect_plan(&self) -> Option<ReconnectPlan> {
        *self.shared.plan.lock().expect("plan lock poisoned")
    }

    /// Reconnect attempts since the last successful connection.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Room this manager is bound to.
    pub fn room(&self) -> &RoomCode {
        &self.shared.room
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("room", &self.shared.room)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor context here; aborting the supervisor is the only
        // option if the owner skipped `disconnect`.
        if let Ok(mut guard) = self.supervisor.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = *self.state_tx.borrow();
        if previous != state {
            debug!("room {}: {} -> {}", self.room, previous, state);
        }
        self.state_tx.send_replace(state);
    }

    fn enter_connected(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.clear_plan();
        self.set_state(ConnectionState::Connected);
        self.dispatcher.publish(&Frame::new(
            events::CONNECTION_ESTABLISHED,
            json!({
                "room": self.room.as_str(),
                "user_id": self.credentials.user_id,
            }),
        ));
        info!("🔗 connected to room {}", self.room);
    }

    fn publish_error(&self, reason: String) {
        self.dispatcher
            .publish(&Frame::new(events::ERROR, json!({ "reason": reason })));
    }

    fn set_plan(&self, plan: ReconnectPlan) {
        *self.plan.lock().expect("plan lock poisoned") = Some(plan);
    }

    fn clear_plan(&self) {
        *self.plan.lock().expect("plan lock poisoned") = None;
    }
}

/// Resolves once a manual disconnect has been requested.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // An Err means the manager itself is gone; treat it as shutdown too.
    let _ = rx.wait_for(|requested| *requested).await;
}

/// Dials and authenticates under the configured timeout.
async fn establish(shared: &Shared) -> Result<Box<dyn Transport>, SyncError> {
    let bound = shared.config.connect_timeout;
    timeout(bound, async {
        shared.set_state(ConnectionState::Connecting);
        let mut transport = shared.connector.connect(&shared.url).await?;

        shared.set_state(ConnectionState::Authenticating);
        let hello = protocol::authenticate(&shared.room, &shared.credentials);
        send_frame(transport.as_mut(), &hello).await?;

        loop {
            match transport.next().await {
                TransportItem::Text(raw) => match Frame::parse(&raw) {
                    Ok(frame) => {
                        // Handshake frames still reach subscribers.
                        shared.dispatcher.publish(&frame);
                        match frame.kind.as_str() {
                            events::AUTHENTICATION_SUCCESS => return Ok(transport),
                            events::AUTHENTICATION_FAILED => {
                                let reason = frame
                                    .data
                                    .get("reason")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("credentials rejected")
                                    .to_string();
                                return Err(SyncError::Authentication(reason));
                            }
                            _ => {}
                        }
                    }
                    Err(e) => warn!("dropping malformed handshake frame: {e}"),
                },
                TransportItem::Closed { code, reason } => {
                    return Err(SyncError::Connection(format!(
                        "closed during handshake (code {code}): {reason}"
                    )))
                }
                TransportItem::Failed(e) => return Err(SyncError::Connection(e)),
            }
        }
    })
    .await
    .map_err(|_| SyncError::Timeout(bound))?
}

async fn send_frame(transport: &mut dyn Transport, frame: &Frame) -> Result<(), SyncError> {
    let wire = frame
        .to_wire()
        .map_err(|e| SyncError::Protocol(format!("unserializable outbound frame: {e}")))?;
    transport.send(wire).await
}

/// Supervisor task: alternates between driving a live connection and the
/// reconnect policy until shutdown, voluntary close, or exhaustion.
async fn run_supervisor(
    shared: Arc<Shared>,
    mut transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();

    loop {
        let exit = drive(&shared, transport.as_mut(), &mut outbound_rx, &mut shutdown_rx).await;
        match exit {
            Exit::Shutdown => {
                transport.close().await;
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
            Exit::Normal => {
                info!("room {}: server closed voluntarily; not reconnecting", shared.room);
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
            Exit::Abnormal(reason) => {
                warn!("room {}: {}", shared.room, reason);
                shared.publish_error(reason);
                match reconnect(&shared, &mut shutdown_rx).await {
                    Some(next) => {
                        transport = next;
                    }
                    None => return,
                }
            }
        }
    }
}

/// Drives one live connection: inbound frames, outbound queue, heartbeat,
/// staleness detection.
async fn drive(
    shared: &Shared,
    transport: &mut dyn Transport,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Exit {
    let mut heartbeat = interval(shared.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval resolves immediately.
    heartbeat.tick().await;

    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown_requested(shutdown_rx) => return Exit::Shutdown,

            item = transport.next() => match item {
                TransportItem::Text(raw) => {
                    last_seen = Instant::now();
                    match Frame::parse(&raw) {
                        Ok(frame) => shared.dispatcher.publish(&frame),
                        Err(e) => warn!("dropping malformed frame: {e}"),
                    }
                }
                TransportItem::Closed { code, .. } if code == NORMAL_CLOSE => {
                    return Exit::Normal;
                }
                TransportItem::Closed { code, reason } => {
                    return Exit::Abnormal(format!("abnormal closure (code {code}): {reason}"));
                }
                TransportItem::Failed(e) => {
                    return Exit::Abnormal(format!("transport failed: {e}"));
                }
            },

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = send_frame(transport, &frame).await {
                            match e {
                                // A frame we could not serialize is a local
                                // bug; it must not take the connection down.
                                SyncError::Protocol(msg) => warn!("{msg}"),
                                other => return Exit::Abnormal(format!("send failed: {other}")),
                            }
                        }
                    }
                    // The sender lives in Shared; it only disappears when
                    // the manager itself is going away.
                    None => return Exit::Shutdown,
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > shared.config.stale_after {
                    return Exit::Abnormal(format!(
                        "no frames for {:?}; link presumed dead",
                        shared.config.stale_after
                    ));
                }
                if let Err(e) = send_frame(transport, &protocol::heartbeat()).await {
                    return Exit::Abnormal(format!("heartbeat send failed: {e}"));
                }
            }
        }
    }
}

/// Runs the exponential backoff loop after an abnormal closure.
///
/// Returns the fresh transport on success, or `None` once shutdown was
/// requested or the attempt budget is exhausted (terminal `Failed`, with an
/// explicit "giving up" error event — consumers are never left to infer
/// exhaustion from silence).
async fn reconnect(
    shared: &Arc<Shared>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<Box<dyn Transport>> {
    loop {
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > shared.config.max_reconnect_attempts {
            shared.clear_plan();
            shared.set_state(ConnectionState::Failed);
            let reason = format!(
                "giving up after {} reconnect attempts",
                shared.config.max_reconnect_attempts
            );
            warn!("room {}: {}", shared.room, reason);
            shared.publish_error(reason);
            return None;
        }

        let delay = reconnect_delay(
            attempt,
            shared.config.reconnect_base,
            shared.config.reconnect_cap,
        );
        shared.set_plan(ReconnectPlan {
            attempt,
            next_delay: delay,
        });
        shared.set_state(ConnectionState::Reconnecting);
        info!(
            "room {}: reconnect attempt {} in {:?}",
            shared.room, attempt, delay
        );

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_requested(shutdown_rx) => {
                shared.clear_plan();
                shared.set_state(ConnectionState::Disconnected);
                return None;
            }
        }

        let result = tokio::select! {
            r = establish(shared) => r,
            _ = shutdown_requested(shutdown_rx) => {
                shared.clear_plan();
                shared.set_state(ConnectionState::Disconnected);
                return None;
            }
        };

        match result {
            Ok(transport) => {
                shared.enter_connected();
                return Some(transport);
            }
            Err(e) if e.is_retryable() => {
                warn!("room {}: reconnect attempt {} failed: {}", shared.room, attempt, e);
            }
            Err(e) => {
                shared.clear_plan();
                shared.set_state(ConnectionState::Failed);
                let reason = format!("giving up: {e}");
                warn!("room {}: {}", shared.room, reason);
                shared.publish_error(reason);
                return None;
            }
        }
    }
}
