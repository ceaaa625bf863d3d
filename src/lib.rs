//! RFQ Realtime - chat session client for the marketplace's RFQ threads
//!
//! Connects to the marketplace realtime server over Socket.IO and relays
//! quote-room messages, presence and typing hints to the application.
//!
//! ## Architecture
//!
//! - **realtime**: connection, rooms and event relay
//! - **endpoint**: realtime URL from the REST API base URL
//! - **config**: TOML configuration with per-field defaults
//!
//! ## Failure Model
//!
//! The session surface is fail-soft: missing connections and transport
//! failures are logged, never returned. Only composition-time steps
//! (config loading, endpoint derivation) return [`RealtimeError`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod realtime;

// Re-exports
pub use config::Config;
pub use error::RealtimeError;
pub use realtime::{ConnectionState, RealtimeClient, RoomKey, SessionConfig, UserType};
