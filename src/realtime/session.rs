//! Realtime Session
//!
//! Single responsibility: Own one connection to the realtime server for the
//! lifetime of a session, reconnecting with a bounded, fixed-delay policy.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ack──► Connected
//!       ▲                        │  ▲                 │
//!       │      attempts spent    │  └─transport lost──┘
//!       ├────────────────────────┘                    │
//!       └──────────── disconnect() / server disconnect┘
//! ```
//!
//! One driver task per session owns the link. Callers never wait on it:
//! outbound packets go through an unbounded channel and the driver reports
//! state through [`Status`], which is tagged with a session generation so a
//! driver that is winding down cannot overwrite the state of its successor.
//!
//! # Reconnection Policy
//!
//! - A failed attempt (open, handshake, or timeout) counts against
//!   `reconnect_attempts`; a successful handshake resets the count.
//! - Attempts are spaced by a fixed `reconnect_delay`. No backoff growth.
//! - A link that is silent for longer than the server's `pingInterval +
//!   pingTimeout` is treated as lost and goes through the same retry path.
//! - A server-side refusal (`connect_error`) or server disconnect ends the
//!   session without retrying.
//! - Rooms are NOT rejoined after a reconnect. Membership lives on the server
//!   and is lost with the old socket; callers must join again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::auth::{authenticate, Credentials, Handshake};
use super::events::EventHandlers;
use super::protocol::{decode, encode, Packet, DEFAULT_NAMESPACE};
use super::transport::{Connector, FrameSink, Link};
use crate::error::RealtimeError;

/// Configuration for a realtime session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Full Socket.IO WebSocket URL
    pub url: String,
    /// Socket.IO namespace
    pub namespace: String,
    /// Retries after the first failed attempt before giving up
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts
    pub reconnect_delay: Duration,
    /// Limit for open + handshake of a single attempt
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5001/socket.io/?EIO=4&transport=websocket".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state shared between the client and its driver.
pub(crate) struct Status {
    inner: Mutex<(u64, ConnectionState)>,
}

impl Status {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new((0, ConnectionState::Disconnected)),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).1
    }

    /// Start a new generation in the `Connecting` state.
    pub(crate) fn begin(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.0 += 1;
        inner.1 = ConnectionState::Connecting;
        inner.0
    }

    /// Update the state if `generation` is still current.
    pub(crate) fn set(&self, generation: u64, state: ConnectionState) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.0 != generation {
            return false;
        }
        inner.1 = state;
        true
    }
}

/// Client-side handle to a running session driver.
pub(crate) struct SessionHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<Packet>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub(crate) fn spawn(
        runtime: &Handle,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        handlers: Arc<EventHandlers>,
        status: Arc<Status>,
    ) -> Self {
        let generation = status.begin();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            generation,
            config,
            connector,
            credentials,
            handlers,
            status,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
        };
        let task = runtime.spawn(driver.run());

        Self {
            generation,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the driver has given up or been shut down.
    pub(crate) fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Queue a packet. It is sent once the socket is connected.
    pub(crate) fn send(&self, packet: Packet) -> Result<(), RealtimeError> {
        self.outbound
            .send(packet)
            .map_err(|_| RealtimeError::Internal("Session driver has stopped".into()))
    }

    /// Ask the driver to disconnect. Does not wait for it.
    pub(crate) fn close(self) {
        let _ = self.shutdown.send(());
    }
}

enum PumpExit {
    Shutdown,
    ServerDisconnect,
    TransportLost,
}

struct Driver {
    generation: u64,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    handlers: Arc<EventHandlers>,
    status: Arc<Status>,
    outbound: mpsc::UnboundedReceiver<Packet>,
    shutdown: oneshot::Receiver<()>,
}

impl Driver {
    async fn run(mut self) {
        let mut failures = 0u32;
        let mut connected_before = false;

        loop {
            self.status.set(self.generation, ConnectionState::Connecting);

            let attempt = tokio::select! {
                _ = &mut self.shutdown => {
                    debug!("Shutdown requested while connecting");
                    return;
                }
                result = establish(self.connector.as_ref(), &self.config, &self.credentials) => result,
            };

            match attempt {
                Ok((link, handshake)) => {
                    failures = 0;
                    if connected_before {
                        warn!("Realtime session reconnected; rooms are not rejoined automatically");
                    }
                    connected_before = true;
                    self.status.set(self.generation, ConnectionState::Connected);
                    info!(
                        url = %self.config.url,
                        engine_sid = %handshake.open.sid,
                        socket_id = ?handshake.socket_id,
                        user_type = %self.credentials.user_type(),
                        "Realtime session connected"
                    );

                    match self.pump(link, handshake.open.heartbeat_window()).await {
                        PumpExit::Shutdown => {
                            info!("Realtime session closed");
                            return;
                        }
                        PumpExit::ServerDisconnect => {
                            self.status.set(self.generation, ConnectionState::Disconnected);
                            info!("Server ended the realtime session");
                            return;
                        }
                        PumpExit::TransportLost => {
                            self.status.set(self.generation, ConnectionState::Connecting);
                            warn!("Realtime transport lost");
                        }
                    }
                }
                Err(RealtimeError::Auth(message)) => {
                    self.status.set(self.generation, ConnectionState::Disconnected);
                    error!(error = %message, "Realtime server refused the session");
                    return;
                }
                Err(e) => {
                    failures += 1;
                    error!(error = %e, attempt = failures, "Realtime connection failed");
                    if failures > self.config.reconnect_attempts {
                        self.status.set(self.generation, ConnectionState::Disconnected);
                        error!(
                            attempts = failures,
                            "Giving up on realtime connection"
                        );
                        return;
                    }
                }
            }

            tokio::select! {
                _ = &mut self.shutdown => {
                    debug!("Shutdown requested while waiting to reconnect");
                    return;
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            warn!(
                attempt = failures + 1,
                max = self.config.reconnect_attempts,
                "Reconnecting realtime session"
            );
        }
    }

    /// Move frames until the link dies or we are told to stop.
    ///
    /// With a heartbeat window, a link that delivers no frame within the
    /// window counts as lost. Every inbound frame restarts the window.
    async fn pump(&mut self, link: Link, heartbeat: Option<Duration>) -> PumpExit {
        let Link { mut sink, mut stream } = link;
        let mut deadline = heartbeat.map(|window| Instant::now() + window);

        loop {
            tokio::select! {
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(
                        window_ms = heartbeat.map(|w| w.as_millis() as u64),
                        "No heartbeat from realtime server"
                    );
                    return PumpExit::TransportLost;
                }
                _ = &mut self.shutdown => {
                    let disconnect = Packet::Disconnect {
                        namespace: self.config.namespace.clone(),
                    };
                    if let Err(e) = send_packet(&mut sink, &disconnect).await {
                        debug!(error = %e, "Failed to send disconnect");
                    }
                    let _ = sink.close().await;
                    return PumpExit::Shutdown;
                }
                Some(packet) = self.outbound.recv() => {
                    if let Err(e) = send_packet(&mut sink, &packet).await {
                        error!(error = %e, "Failed to send packet");
                        return PumpExit::TransportLost;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        deadline = heartbeat.map(|window| Instant::now() + window);
                        if let Some(exit) =
                            handle_frame(&text, &self.config.namespace, &self.handlers, &mut sink).await
                        {
                            return exit;
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Realtime transport error");
                        return PumpExit::TransportLost;
                    }
                    None => {
                        info!("Realtime server closed the connection");
                        return PumpExit::TransportLost;
                    }
                }
            }
        }
    }
}

/// One connection attempt: open the link and complete the handshake.
async fn establish(
    connector: &dyn Connector,
    config: &SessionConfig,
    credentials: &Credentials,
) -> Result<(Link, Handshake), RealtimeError> {
    let attempt = async {
        let mut link = connector.open(&config.url).await?;
        let handshake = authenticate(&mut link, credentials, &config.namespace).await?;
        Ok::<_, RealtimeError>((link, handshake))
    };

    tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| {
            RealtimeError::Timeout(format!(
                "No handshake within {}ms",
                config.connect_timeout.as_millis()
            ))
        })?
}

async fn handle_frame(
    text: &str,
    namespace: &str,
    handlers: &EventHandlers,
    sink: &mut FrameSink,
) -> Option<PumpExit> {
    match decode(text) {
        Ok(Packet::Ping) => {
            if let Err(e) = send_packet(sink, &Packet::Pong).await {
                error!(error = %e, "Failed to answer ping");
                return Some(PumpExit::TransportLost);
            }
        }
        Ok(Packet::Event { namespace: ns, name, data }) if ns == namespace => {
            handlers.dispatch(&name, data);
        }
        Ok(Packet::Disconnect { namespace: ns }) if ns == namespace => {
            return Some(PumpExit::ServerDisconnect);
        }
        Ok(Packet::Close) => return Some(PumpExit::TransportLost),
        Ok(other) => debug!(packet = ?other, "Ignoring packet"),
        Err(e) => warn!(error = %e, "Dropping undecodable frame"),
    }
    None
}

async fn send_packet(sink: &mut FrameSink, packet: &Packet) -> Result<(), RealtimeError> {
    sink.send(encode(packet)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.url, "ws://localhost:5001/socket.io/?EIO=4&transport=websocket");
        assert_eq!(config.namespace, "/");
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_status_ignores_stale_generation() {
        let status = Status::new();
        assert_eq!(status.state(), ConnectionState::Disconnected);

        let first = status.begin();
        assert_eq!(status.state(), ConnectionState::Connecting);
        let second = status.begin();

        assert!(!status.set(first, ConnectionState::Disconnected));
        assert_eq!(status.state(), ConnectionState::Connecting);
        assert!(status.set(second, ConnectionState::Connected));
        assert_eq!(status.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_send_after_driver_stopped_is_internal_error() {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _shutdown_rx) = oneshot::channel();
        drop(outbound_rx);
        let handle = SessionHandle {
            generation: 1,
            outbound,
            shutdown,
            task: tokio::spawn(async {}),
        };

        let err = handle.send(Packet::Ping).unwrap_err();
        assert!(matches!(err, RealtimeError::Internal(_)));
    }
}
