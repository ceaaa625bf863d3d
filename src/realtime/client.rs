//! Realtime Client
//!
//! Single responsibility: The one object the application holds for RFQ chat.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    RealtimeClient                       │
//! │  - connect / disconnect / is_connected                  │
//! │  - join_room / leave_room                               │
//! │  - send_message / emit_typing / emit_stop_typing        │
//! │  - on_* handler registration                            │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │               Session driver (one task)                 │
//! │  - owns the link, answers pings, dispatches events      │
//! │  - fixed-delay bounded reconnect                        │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!               ┌────────────┼────────────┐
//!               ▼            ▼            ▼
//!          Transport      Protocol       Auth
//! ```
//!
//! # Failure Policy
//!
//! Nothing on this surface returns an error. Calls made without an active
//! session are logged and dropped; transport failures are logged by the
//! driver. Emits are best-effort: there is no acknowledgement, so a caller
//! cannot tell a delivered message from a dropped one.
//!
//! The client is constructed by the application's composition root and
//! shared by reference (or `Arc`). There is no global instance.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::auth::{Credentials, UserType};
use super::events::{
    EventHandlers, NewMessageEvent, OutboundEvent, PresenceEvent, RoomMembersEvent, TypingEvent,
};
use super::protocol::Packet;
use super::rooms::{RoomKey, RoomMessage};
use super::session::{ConnectionState, SessionConfig, SessionHandle, Status};
use super::transport::{Connector, WebSocketConnector};

/// Real-time session client for RFQ chat rooms.
///
/// # Guarantees
///
/// - At most one session is active at a time
/// - `connect()` while a session is active is a no-op
/// - Handlers survive reconnects and may be registered at any time
///
/// # Non-Guarantees
///
/// - Delivery of any emit
/// - Room membership after a transport-level reconnect
pub struct RealtimeClient {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    handlers: Arc<EventHandlers>,
    status: Arc<Status>,
    session: Mutex<Option<SessionHandle>>,
}

impl RealtimeClient {
    /// Client that connects over a real WebSocket.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Client that opens links through `connector`.
    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            handlers: Arc::new(EventHandlers::new()),
            status: Arc::new(Status::new()),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for `token` / `user_type`.
    ///
    /// Returns immediately; the connection is made in the background. Must be
    /// called from within a tokio runtime.
    pub fn connect(&self, token: impl Into<String>, user_type: UserType) {
        let mut session = self.lock_session();

        if let Some(existing) = session.as_ref() {
            if existing.is_active() {
                debug!(user_type = %user_type, "Realtime session already active, ignoring connect");
                return;
            }
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Cannot connect realtime session outside a tokio runtime");
                return;
            }
        };

        info!(url = %self.config.url, user_type = %user_type, "Connecting realtime session");

        *session = Some(SessionHandle::spawn(
            &runtime,
            self.config.clone(),
            Arc::clone(&self.connector),
            Credentials::new(token, user_type),
            Arc::clone(&self.handlers),
            Arc::clone(&self.status),
        ));
    }

    /// End the session, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let Some(handle) = self.lock_session().take() else {
            debug!("Disconnect called without an active realtime session");
            return;
        };

        self.status
            .set(handle.generation(), ConnectionState::Disconnected);
        handle.close();
        info!("Realtime session disconnected");
    }

    /// True only while the socket is acknowledged by the server.
    pub fn is_connected(&self) -> bool {
        self.status.state() == ConnectionState::Connected
    }

    /// Current connection state. `Connecting` also covers waiting between
    /// reconnect attempts.
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Ask the server to add this socket to the RFQ room.
    ///
    /// Fire-and-forget: nothing confirms the join. Dropped with a warning if
    /// there is no active session; queued until the ack while connecting.
    pub fn join_room(&self, quote_id: i64, customer_quote_id: i64) {
        self.emit(OutboundEvent::JoinRoom, &RoomKey::new(quote_id, customer_quote_id));
    }

    /// Leave the RFQ room. Fire-and-forget, like [`join_room`](Self::join_room).
    pub fn leave_room(&self, quote_id: i64, customer_quote_id: i64) {
        self.emit(OutboundEvent::LeaveRoom, &RoomKey::new(quote_id, customer_quote_id));
    }

    /// Post `text` to the room. The server relays it to room members as a
    /// `new-rfq-message` event.
    ///
    /// Fire-and-forget: delivery is not confirmed, and the message is dropped
    /// if there is no active session.
    pub fn send_message(&self, quote_id: i64, customer_quote_id: i64, text: impl Into<String>) {
        let payload = RoomMessage {
            room: RoomKey::new(quote_id, customer_quote_id),
            message: text.into(),
        };
        self.emit(OutboundEvent::SendMessage, &payload);
    }

    /// Tell the room this user started typing. Dropped without a session.
    pub fn emit_typing(&self, quote_id: i64, customer_quote_id: i64) {
        self.emit(OutboundEvent::TypingStart, &RoomKey::new(quote_id, customer_quote_id));
    }

    /// Tell the room this user stopped typing. Dropped without a session.
    pub fn emit_stop_typing(&self, quote_id: i64, customer_quote_id: i64) {
        self.emit(OutboundEvent::TypingStop, &RoomKey::new(quote_id, customer_quote_id));
    }

    pub fn on_new_message(&self, handler: impl Fn(NewMessageEvent) + Send + Sync + 'static) {
        self.handlers.on_new_message(handler);
    }

    pub fn on_user_joined(&self, handler: impl Fn(PresenceEvent) + Send + Sync + 'static) {
        self.handlers.on_user_joined(handler);
    }

    pub fn on_user_left(&self, handler: impl Fn(PresenceEvent) + Send + Sync + 'static) {
        self.handlers.on_user_left(handler);
    }

    pub fn on_room_members(&self, handler: impl Fn(RoomMembersEvent) + Send + Sync + 'static) {
        self.handlers.on_room_members(handler);
    }

    pub fn on_user_typing(&self, handler: impl Fn(TypingEvent) + Send + Sync + 'static) {
        self.handlers.on_user_typing(handler);
    }

    pub fn on_user_stopped_typing(&self, handler: impl Fn(TypingEvent) + Send + Sync + 'static) {
        self.handlers.on_user_stopped_typing(handler);
    }

    /// The handler table, for clearing slots.
    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    fn emit<T: Serialize>(&self, event: OutboundEvent, payload: &T) {
        let session = self.lock_session();
        let Some(handle) = session.as_ref().filter(|h| h.is_active()) else {
            warn!(event = %event, "No active realtime connection, dropping emit");
            return;
        };

        let packet = match Packet::event(&self.config.namespace, event.as_str(), payload) {
            Ok(packet) => packet,
            Err(e) => {
                error!(event = %event, error = %e, "Failed to encode emit");
                return;
            }
        };

        match handle.send(packet) {
            Ok(()) => debug!(event = %event, "Emit queued"),
            Err(e) => warn!(event = %event, error = %e, "Dropping emit"),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RealtimeClient {
    /// Dropping the client ends its session the same way `disconnect` does.
    fn drop(&mut self) {
        if let Some(handle) = self.lock_session().take() {
            handle.close();
            debug!("Realtime client dropped, session closing");
        }
    }
}
