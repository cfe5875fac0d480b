//! Ordered, deduplicated timeline of chat and room notifications.
//!
//! The buffer is fed exclusively through dispatcher subscriptions: user chat
//! arrives as `chat_message`/`chat_broadcast` frames, and system/game
//! notifications (join, leave, game started, attempts) are synthesized here
//! so consumers read one consistent timeline.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tessera_events::{events, EventDispatcher, EventError, Frame, Subscription};
use tracing::trace;
use uuid::Uuid;

/// Origin of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Typed by a player.
    User,
    /// Synthesized from room membership events.
    System,
    /// Synthesized from game progress events.
    Game,
}

/// One entry in the room timeline.
///
/// `id` is unique within the buffer — appending a duplicate is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Deduplication key.
    pub id: String,
    /// Author, when the entry came from a player.
    pub user_id: Option<UserId>,
    /// Display name of the author or subject.
    pub username: Option<String>,
    /// Rendered message text.
    pub text: String,
    /// When the entry was appended locally.
    pub timestamp: DateTime<Utc>,
    /// Origin of the entry.
    pub kind: MessageKind,
}

/// Payload shape shared by `chat_message` and `chat_broadcast` frames.
#[derive(Debug, Deserialize)]
struct ChatPayload {
    id: Option<String>,
    user_id: Option<UserId>,
    username: Option<String>,
    #[serde(alias = "message")]
    text: String,
}

/// Payload shape shared by membership and attempt frames.
#[derive(Debug, Deserialize)]
struct PlayerPayload {
    user_id: Option<UserId>,
    username: Option<String>,
}

struct BufferInner {
    messages: VecDeque<ChatMessage>,
    ids: HashSet<String>,
}

/// Bounded, id-deduplicated message log.
pub struct MessageBuffer {
    inner: Mutex<BufferInner>,
    capacity: usize,
}

impl MessageBuffer {
    /// Creates an empty buffer retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                messages: VecDeque::new(),
                ids: HashSet::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Appends a message in arrival order.
    ///
    /// Returns `false` (leaving the buffer untouched) when a message with
    /// the same id is already present. When the retention cap is exceeded
    /// the oldest entry is dropped.
    pub fn append(&self, message: ChatMessage) -> bool {
        let mut inner = self.inner.lock().expect("buffer lock poisoned");
        if !inner.ids.insert(message.id.clone()) {
            trace!("duplicate message {} ignored", message.id);
            return false;
        }
        inner.messages.push_back(message);
        if inner.messages.len() > self.capacity {
            if let Some(evicted) = inner.messages.pop_front() {
                inner.ids.remove(&evicted.id);
            }
        }
        true
    }

    /// Snapshot of the timeline, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner
            .lock()
            .expect("buffer lock poisoned")
            .messages
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("buffer lock poisoned").messages.len()
    }

    /// True when no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wires the buffer into the dispatcher.
    ///
    /// The returned subscriptions must be held by the session owner;
    /// dropping them detaches the buffer from the event flow.
    pub fn attach(self: Arc<Self>, dispatcher: &EventDispatcher) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();

        for chat_event in [events::CHAT_MESSAGE, events::CHAT_BROADCAST] {
            let buffer = Arc::clone(&self);
            subscriptions.push(dispatcher.on(
                chat_event,
                move |payload: ChatPayload, frame: &Frame| {
                    buffer.append(chat_entry(payload, frame));
                    Ok(())
                },
            ));
        }

        let buffer = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::PLAYER_JOINED,
            move |payload: PlayerPayload, _: &Frame| {
                buffer.append(notice(
                    MessageKind::System,
                    &payload,
                    format!("{} joined the room", display_name(&payload)),
                ));
                Ok(())
            },
        ));

        let buffer = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::PLAYER_LEFT,
            move |payload: PlayerPayload, _: &Frame| {
                buffer.append(notice(
                    MessageKind::System,
                    &payload,
                    format!("{} left the room", display_name(&payload)),
                ));
                Ok(())
            },
        ));

        let buffer = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::GAME_STARTED,
            move |_: serde_json::Value, _: &Frame| {
                buffer.append(notice_anonymous(MessageKind::Game, "The game has started"));
                Ok(())
            },
        ));

        let buffer = Arc::clone(&self);
        subscriptions.push(dispatcher.on(
            events::ATTEMPT_MADE,
            move |payload: PlayerPayload, _: &Frame| {
                buffer.append(notice(
                    MessageKind::Game,
                    &payload,
                    format!("{} made an attempt", display_name(&payload)),
                ));
                Ok(())
            },
        ));

        subscriptions
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn display_name(payload: &PlayerPayload) -> String {
    payload
        .username
        .clone()
        .or_else(|| payload.user_id.map(|id| id.to_string()))
        .unwrap_or_else(|| "A player".to_string())
}

fn chat_entry(payload: ChatPayload, frame: &Frame) -> ChatMessage {
    // Prefer the envelope id, then the payload id; only invent one when the
    // server sent neither (no dedup is possible then anyway).
    let id = frame
        .message_id
        .clone()
        .or(payload.id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ChatMessage {
        id,
        user_id: payload.user_id,
        username: payload.username,
        text: payload.text,
        timestamp: Utc::now(),
        kind: MessageKind::User,
    }
}

fn notice(kind: MessageKind, payload: &PlayerPayload, text: String) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: payload.user_id,
        username: payload.username.clone(),
        text,
        timestamp: Utc::now(),
        kind,
    }
}

fn notice_anonymous(kind: MessageKind, text: &str) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4().to_string(),
        user_id: None,
        username: None,
        text: text.to_string(),
        timestamp: Utc::now(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_events::create_dispatcher;

    fn entry(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            user_id: None,
            username: Some("alice".into()),
            text: text.to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::User,
        }
    }

    #[test]
    fn append_is_idempotent_per_id() {
        let buffer = MessageBuffer::new(10);
        assert!(buffer.append(entry("m1", "hello")));
        assert!(!buffer.append(entry("m1", "hello again")));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.messages()[0].text, "hello");
    }

    #[test]
    fn overflow_drops_oldest() {
        let buffer = MessageBuffer::new(3);
        for i in 0..5 {
            buffer.append(entry(&format!("m{i}"), &format!("msg {i}")));
        }
        let texts: Vec<_> = buffer.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);

        // An evicted id may legitimately reappear.
        assert!(buffer.append(entry("m0", "back")));
    }

    #[test]
    fn duplicate_chat_frame_appends_once() {
        let dispatcher = create_dispatcher();
        let buffer = Arc::new(MessageBuffer::new(100));
        let _subs = Arc::clone(&buffer).attach(&dispatcher);

        let frame = Frame::new(
            events::CHAT_MESSAGE,
            json!({ "username": "alice", "text": "hi" }),
        )
        .with_message_id("m1");

        dispatcher.publish(&frame);
        dispatcher.publish(&frame);

        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn membership_events_synthesize_notices() {
        let dispatcher = create_dispatcher();
        let buffer = Arc::new(MessageBuffer::new(100));
        let _subs = Arc::clone(&buffer).attach(&dispatcher);

        dispatcher.publish(&Frame::new(
            events::PLAYER_JOINED,
            json!({ "user_id": UserId::new(), "username": "bob" }),
        ));
        dispatcher.publish(&Frame::new(events::GAME_STARTED, json!({})));
        dispatcher.publish(&Frame::new(
            events::PLAYER_LEFT,
            json!({ "username": "bob" }),
        ));

        let messages = buffer.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, "bob joined the room");
        assert_eq!(messages[0].kind, MessageKind::System);
        assert_eq!(messages[1].text, "The game has started");
        assert_eq!(messages[1].kind, MessageKind::Game);
        assert_eq!(messages[2].text, "bob left the room");
    }

    #[test]
    fn chat_and_notices_interleave_in_arrival_order() {
        let dispatcher = create_dispatcher();
        let buffer = Arc::new(MessageBuffer::new(100));
        let _subs = Arc::clone(&buffer).attach(&dispatcher);

        dispatcher.publish(&Frame::new(
            events::PLAYER_JOINED,
            json!({ "username": "carol" }),
        ));
        dispatcher.publish(
            &Frame::new(
                events::CHAT_BROADCAST,
                json!({ "username": "carol", "message": "good luck!" }),
            )
            .with_message_id("m2"),
        );

        let messages = buffer.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::System);
        assert_eq!(messages[1].text, "good luck!");
        assert_eq!(messages[1].kind, MessageKind::User);
    }

    #[test]
    fn detached_buffer_stops_receiving() {
        let dispatcher = create_dispatcher();
        let buffer = Arc::new(MessageBuffer::new(100));
        let subs = Arc::clone(&buffer).attach(&dispatcher);
        drop(subs);

        dispatcher.publish(
            &Frame::new(events::CHAT_MESSAGE, json!({ "text": "lost" })).with_message_id("m3"),
        );
        assert!(buffer.is_empty());
    }
}
