//! Real-time RFQ Chat Connection Module
//!
//! Binds one bidirectional Socket.IO connection to RFQ chat rooms and relays
//! messages, presence and typing hints.
//!
//! # Architecture
//!
//! | Module      | Responsibility                                    |
//! |-------------|---------------------------------------------------|
//! | `transport` | Open a link, move text frames                     |
//! | `protocol`  | Socket.IO / Engine.IO v4 packet codec             |
//! | `auth`      | `{token, userType}` handshake                     |
//! | `session`   | One connection per session, bounded reconnect     |
//! | `rooms`     | Room key and room-scoped payloads                 |
//! | `events`    | Inbound payload types and single-slot handlers    |
//! | `client`    | The application-facing client                     |
//!
//! # Usage
//!
//! ```ignore
//! use rfq_realtime::realtime::{RealtimeClient, SessionConfig, UserType};
//!
//! let client = RealtimeClient::new(SessionConfig::default());
//! client.on_new_message(|event| println!("{}: {}", event.sender.name, event.message.text));
//! client.connect(token, UserType::Customer);
//! client.join_room(quote_id, customer_quote_id);
//! client.send_message(quote_id, customer_quote_id, "Can you ship by Friday?");
//! ```

mod auth;
mod client;
mod events;
mod rooms;
mod session;

pub mod protocol;
pub mod transport;

pub use auth::{Credentials, UserType};
pub use client::RealtimeClient;
pub use events::{
    ChatMessage, EventHandlers, InboundEvent, NewMessageEvent, OutboundEvent, Participant,
    PresenceEvent, RoomMembersEvent, Sender, TypingEvent,
};
pub use rooms::{RoomKey, RoomMessage};
pub use session::{ConnectionState, SessionConfig};
pub use transport::{Connector, Link, MemoryPeer, WebSocketConnector};
