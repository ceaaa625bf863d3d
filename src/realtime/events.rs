//! Event Relay
//!
//! Typed payloads for the RFQ chat events and the single-slot handler table
//! the session dispatches into.
//!
//! Each inbound event has exactly one handler slot. Registering a handler
//! replaces whatever was there; there is no fan-out.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::auth::UserType;

/// Events the client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom,
    LeaveRoom,
    SendMessage,
    TypingStart,
    TypingStop,
}

impl OutboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom => "join-rfq-room",
            OutboundEvent::LeaveRoom => "leave-rfq-room",
            OutboundEvent::SendMessage => "send-rfq-message",
            OutboundEvent::TypingStart => "typing-start",
            OutboundEvent::TypingStop => "typing-stop",
        }
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage,
    UserJoined,
    UserLeft,
    RoomMembers,
    UserTyping,
    UserStoppedTyping,
}

impl InboundEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundEvent::NewMessage => "new-rfq-message",
            InboundEvent::UserJoined => "user-joined",
            InboundEvent::UserLeft => "user-left",
            InboundEvent::RoomMembers => "room-members",
            InboundEvent::UserTyping => "user-typing",
            InboundEvent::UserStoppedTyping => "user-stopped-typing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "new-rfq-message" => Some(InboundEvent::NewMessage),
            "user-joined" => Some(InboundEvent::UserJoined),
            "user-left" => Some(InboundEvent::UserLeft),
            "room-members" => Some(InboundEvent::RoomMembers),
            "user-typing" => Some(InboundEvent::UserTyping),
            "user-stopped-typing" => Some(InboundEvent::UserStoppedTyping),
            _ => None,
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chat message body inside a `new-rfq-message` event.
///
/// Fields the client does not model are kept in `extra` and timestamps are
/// kept as sent, so the payload reaches the handler unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_supplier_id: Option<i64>,
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// `created_at` as a UTC time, if it is RFC 3339.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.created_at)
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessageEvent {
    pub message: ChatMessage,
    pub sender: Sender,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewMessageEvent {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.timestamp)
    }
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// A room participant as reported by presence events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub user_type: UserType,
}

/// `user-joined` / `user-left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user: Participant,
    pub quote_id: i64,
    pub customer_quote_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `room-members`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMembersEvent {
    pub quote_id: i64,
    pub customer_quote_id: i64,
    #[serde(default)]
    pub members: Vec<Participant>,
}

/// `user-typing` / `user-stopped-typing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user: Participant,
    pub quote_id: i64,
    pub customer_quote_id: i64,
}

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// One replaceable handler.
struct Slot<T> {
    handler: RwLock<Option<Handler<T>>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }

    fn set(&self, handler: Handler<T>) {
        let mut guard = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(handler);
    }

    fn clear(&self) {
        let mut guard = self.handler.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn get(&self) -> Option<Handler<T>> {
        self.handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Handler table, one slot per inbound event.
pub struct EventHandlers {
    new_message: Slot<NewMessageEvent>,
    user_joined: Slot<PresenceEvent>,
    user_left: Slot<PresenceEvent>,
    room_members: Slot<RoomMembersEvent>,
    user_typing: Slot<TypingEvent>,
    user_stopped_typing: Slot<TypingEvent>,
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self {
            new_message: Slot::new(),
            user_joined: Slot::new(),
            user_left: Slot::new(),
            room_members: Slot::new(),
            user_typing: Slot::new(),
            user_stopped_typing: Slot::new(),
        }
    }

    pub fn on_new_message(&self, handler: impl Fn(NewMessageEvent) + Send + Sync + 'static) {
        self.new_message.set(Arc::new(handler));
    }

    pub fn on_user_joined(&self, handler: impl Fn(PresenceEvent) + Send + Sync + 'static) {
        self.user_joined.set(Arc::new(handler));
    }

    pub fn on_user_left(&self, handler: impl Fn(PresenceEvent) + Send + Sync + 'static) {
        self.user_left.set(Arc::new(handler));
    }

    pub fn on_room_members(&self, handler: impl Fn(RoomMembersEvent) + Send + Sync + 'static) {
        self.room_members.set(Arc::new(handler));
    }

    pub fn on_user_typing(&self, handler: impl Fn(TypingEvent) + Send + Sync + 'static) {
        self.user_typing.set(Arc::new(handler));
    }

    pub fn on_user_stopped_typing(&self, handler: impl Fn(TypingEvent) + Send + Sync + 'static) {
        self.user_stopped_typing.set(Arc::new(handler));
    }

    /// Empty one slot.
    pub fn clear(&self, event: InboundEvent) {
        match event {
            InboundEvent::NewMessage => self.new_message.clear(),
            InboundEvent::UserJoined => self.user_joined.clear(),
            InboundEvent::UserLeft => self.user_left.clear(),
            InboundEvent::RoomMembers => self.room_members.clear(),
            InboundEvent::UserTyping => self.user_typing.clear(),
            InboundEvent::UserStoppedTyping => self.user_stopped_typing.clear(),
        }
    }

    /// Route a raw event to its slot.
    ///
    /// Returns true if a handler was invoked. Unknown events, undecodable
    /// payloads and empty slots are logged and dropped.
    pub fn dispatch(&self, name: &str, data: Value) -> bool {
        let Some(event) = InboundEvent::from_name(name) else {
            debug!(event = %name, "Ignoring unknown event");
            return false;
        };

        match event {
            InboundEvent::NewMessage => fire(&self.new_message, event, data),
            InboundEvent::UserJoined => fire(&self.user_joined, event, data),
            InboundEvent::UserLeft => fire(&self.user_left, event, data),
            InboundEvent::RoomMembers => fire(&self.room_members, event, data),
            InboundEvent::UserTyping => fire(&self.user_typing, event, data),
            InboundEvent::UserStoppedTyping => fire(&self.user_stopped_typing, event, data),
        }
    }
}

fn fire<T: DeserializeOwned>(slot: &Slot<T>, event: InboundEvent, data: Value) -> bool {
    // Lock is released before the handler runs so it may re-register.
    let Some(handler) = slot.get() else {
        debug!(event = %event, "No handler registered, dropping event");
        return false;
    };

    match serde_json::from_value::<T>(data) {
        Ok(payload) => {
            handler(payload);
            true
        }
        Err(e) => {
            warn!(event = %event, error = %e, "Failed to decode event payload");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn typing_payload() -> Value {
        json!({
            "user": { "id": 9, "name": "Acme Supply", "type": "supplier" },
            "quoteId": 7,
            "customerQuoteId": 42
        })
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in [
            InboundEvent::NewMessage,
            InboundEvent::UserJoined,
            InboundEvent::UserLeft,
            InboundEvent::RoomMembers,
            InboundEvent::UserTyping,
            InboundEvent::UserStoppedTyping,
        ] {
            assert_eq!(InboundEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(InboundEvent::from_name("join-rfq-room"), None);
    }

    #[test]
    fn test_dispatch_typing() {
        let handlers = EventHandlers::new();
        let seen = Arc::new(RwLock::new(None));
        let seen_in = Arc::clone(&seen);
        handlers.on_user_typing(move |event| {
            *seen_in.write().unwrap() = Some(event);
        });

        assert!(handlers.dispatch("user-typing", typing_payload()));

        let event = seen.read().unwrap().clone().unwrap();
        assert_eq!(event.user.id, 9);
        assert_eq!(event.user.user_type, UserType::Supplier);
        assert_eq!(event.quote_id, 7);
        assert_eq!(event.customer_quote_id, 42);
    }

    #[test]
    fn test_new_message_keeps_unknown_fields() {
        let payload = json!({
            "message": {
                "id": 501,
                "text": "Revised price attached",
                "senderCustomerId": 4,
                "createdAt": "2024-05-01 10:00:00",
                "attachments": ["quote-v2.pdf"]
            },
            "sender": {
                "id": 4,
                "name": "Dana",
                "email": "dana@buyer.example",
                "type": "customer",
                "company": "Buyer Ltd"
            },
            "timestamp": "2024-05-01T10:00:01.250+02:00",
            "quoteId": 7
        });

        let handlers = EventHandlers::new();
        let seen = Arc::new(RwLock::new(None));
        let seen_in = Arc::clone(&seen);
        handlers.on_new_message(move |event| {
            *seen_in.write().unwrap() = Some(event);
        });
        assert!(handlers.dispatch("new-rfq-message", payload.clone()));

        let event = seen.read().unwrap().clone().unwrap();
        assert_eq!(event.message.extra["id"], json!(501));
        assert_eq!(event.sender.extra["company"], json!("Buyer Ltd"));
        assert_eq!(event.extra["quoteId"], json!(7));
        assert_eq!(event.message.created_at, "2024-05-01 10:00:00");
        assert_eq!(event.message.created_at_utc(), None);
        assert_eq!(
            event.timestamp_utc().unwrap().to_rfc3339(),
            "2024-05-01T08:00:01.250+00:00"
        );
        assert_eq!(serde_json::to_value(&event).unwrap(), payload);
    }

    #[test]
    fn test_register_replaces_previous_handler() {
        let handlers = EventHandlers::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        handlers.on_user_stopped_typing(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        handlers.on_user_stopped_typing(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handlers.dispatch("user-stopped-typing", typing_payload());
        handlers.dispatch("user-stopped-typing", typing_payload());

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispatch_drops_bad_and_unhandled() {
        let handlers = EventHandlers::new();
        assert!(!handlers.dispatch("room-members", json!({ "quoteId": 1, "customerQuoteId": 2 })));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        handlers.on_room_members(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!handlers.dispatch("room-members", json!("not an object")));
        assert!(!handlers.dispatch("mystery", json!({})));
        assert!(handlers.dispatch("room-members", json!({ "quoteId": 1, "customerQuoteId": 2 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handlers.clear(InboundEvent::RoomMembers);
        assert!(!handlers.dispatch("room-members", json!({ "quoteId": 1, "customerQuoteId": 2 })));
    }
}
