//! The typed publish/subscribe registry.
//!
//! One [`EventDispatcher`] instance exists per room session. Publishing is
//! synchronous: by the time [`EventDispatcher::publish`] returns, every
//! handler that was subscribed when the call started has run exactly once.
//! Handlers registered *during* a publish only see later frames.

use crate::error::EventError;
use crate::frame::Frame;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Boxed handler invoked for every frame of a subscribed type.
pub type FrameHandler = Arc<dyn Fn(&Frame) -> Result<(), EventError> + Send + Sync>;

struct HandlerEntry {
    id: u64,
    handler: FrameHandler,
}

/// Counters describing dispatcher activity since creation.
///
/// Useful for health logging and for asserting delivery in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Frames handed to `publish`.
    pub published: u64,
    /// Individual handler invocations that completed without error.
    pub delivered: u64,
    /// Handler invocations that returned an error (logged and skipped).
    pub handler_errors: u64,
    /// Frames published with no subscriber for their type.
    pub unrouted: u64,
}

struct Registry {
    handlers: DashMap<String, Vec<HandlerEntry>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    handler_errors: AtomicU64,
    unrouted: AtomicU64,
}

impl Registry {
    fn remove(&self, event_type: &str, id: u64) {
        if let Some(mut entries) = self.handlers.get_mut(event_type) {
            entries.retain(|e| e.id != id);
        }
    }
}

/// Synchronous typed publish/subscribe registry.
///
/// The registry itself sits behind an internal `Arc`, so [`Subscription`]
/// disposers can reach back into it without keeping it alive.
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                handler_errors: AtomicU64::new(0),
                unrouted: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes a raw frame handler to one frame type.
    ///
    /// Returns a [`Subscription`] that removes exactly this handler — and no
    /// other — when disposed or dropped. Handlers for the same type run in
    /// registration order.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Frame) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .entry(event_type.to_string())
            .or_default()
            .push(HandlerEntry {
                id,
                handler: Arc::new(handler),
            });

        trace!("subscribed handler {} to '{}'", id, event_type);
        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type: event_type.to_string(),
            id,
        }
    }

    /// Subscribes a handler that receives the frame payload decoded into `T`.
    ///
    /// Frames whose `data` does not deserialize into `T` are logged and
    /// dropped for this handler; other handlers still see them. The decoded
    /// payload is passed alongside the full frame so handlers keep access to
    /// the envelope (`timestamp`, `message_id`).
    pub fn on<T, F>(&self, event_type: &str, handler: F) -> Subscription
    where
        T: serde::de::DeserializeOwned,
        F: Fn(T, &Frame) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event = event_type.to_string();
        self.subscribe(event_type, move |frame: &Frame| {
            match serde_json::from_value::<T>(frame.data.clone()) {
                Ok(payload) => handler(payload, frame),
                Err(e) => Err(EventError::payload(&event, e)),
            }
        })
    }

    /// Publishes a frame to every handler currently subscribed to its type.
    ///
    /// Delivery is synchronous and at-most-once per handler per call: the
    /// subscriber list is snapshotted up front, so handlers added while the
    /// publish is running are not invoked for this frame, and a disposer
    /// racing with the publish cannot cause double delivery. Handler errors
    /// are logged and counted; they never interrupt the remaining handlers.
    pub fn publish(&self, frame: &Frame) {
        self.registry.published.fetch_add(1, Ordering::Relaxed);

        // Snapshot the handler list and release the map entry before running
        // any handler, so handlers may subscribe/dispose without deadlocking.
        let snapshot: Vec<(u64, FrameHandler)> = match self.registry.handlers.get(&frame.kind) {
            Some(entries) => entries
                .iter()
                .map(|e| (e.id, Arc::clone(&e.handler)))
                .collect(),
            None => Vec::new(),
        };

        if snapshot.is_empty() {
            self.registry.unrouted.fetch_add(1, Ordering::Relaxed);
            trace!("no subscribers for '{}'", frame.kind);
            return;
        }

        for (id, handler) in snapshot {
            match handler(frame) {
                Ok(()) => {
                    self.registry.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.registry.handler_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("handler {} for '{}' failed: {}", id, frame.kind, e);
                }
            }
        }
    }

    /// Number of live handlers for one frame type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry
            .handlers
            .get(event_type)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    /// Current activity counters.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            published: self.registry.published.load(Ordering::Relaxed),
            delivered: self.registry.delivered.load(Ordering::Relaxed),
            handler_errors: self.registry.handler_errors.load(Ordering::Relaxed),
            unrouted: self.registry.unrouted.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.registry.handlers.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Disposer returned by [`EventDispatcher::subscribe`].
///
/// Dropping the subscription (or calling [`Subscription::dispose`]) removes
/// the handler it represents. Holding the subscription keeps the handler
/// registered; it does not keep the dispatcher itself alive.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Registry>,
    event_type: String,
    id: u64,
}

impl Subscription {
    /// Removes the subscribed handler immediately.
    pub fn dispose(self) {
        // Drop does the actual removal.
    }

    /// Frame type this subscription is registered for.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
            trace!("disposed handler {} for '{}'", self.id, self.event_type);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("event_types", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
