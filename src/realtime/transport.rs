//! WebSocket Transport Layer
//!
//! Single responsibility: Open a connection and move text frames in both directions.
//! No knowledge of Socket.IO packets, authentication, or session management.
//!
//! The session only ever sees a [`Link`]: a boxed frame sink plus a boxed frame
//! stream. [`WebSocketConnector`] produces links backed by `tokio-tungstenite`;
//! [`Link::channel`] produces an in-memory link whose far end is a [`MemoryPeer`].

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, sink, stream, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::debug;

use crate::error::RealtimeError;

/// Send half of a link: one `String` per text frame.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = RealtimeError> + Send>>;

/// Receive half of a link. Ends when the connection closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RealtimeError>> + Send>>;

/// An open, bidirectional frame connection.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new<S, T>(sink: S, stream: T) -> Self
    where
        S: Sink<String, Error = RealtimeError> + Send + 'static,
        T: Stream<Item = Result<String, RealtimeError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// An in-memory link. Frames written to the link arrive on
    /// `MemoryPeer::sent`; frames pushed into `MemoryPeer::inbound` are read
    /// from the link. Dropping `inbound` ends the link's stream.
    pub fn channel() -> (Self, MemoryPeer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<String, RealtimeError>>();

        let frame_sink = sink::unfold(sent_tx, |tx, frame: String| async move {
            tx.send(frame)
                .map_err(|_| RealtimeError::Connection("Peer hung up".into()))?;
            Ok::<_, RealtimeError>(tx)
        });

        let frame_stream = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let peer = MemoryPeer {
            sent: sent_rx,
            inbound: inbound_tx,
        };
        (Self::new(frame_sink, frame_stream), peer)
    }
}

/// The far end of an in-memory [`Link`].
pub struct MemoryPeer {
    /// Frames the link owner has sent.
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Frames (or errors) to deliver to the link owner.
    pub inbound: mpsc::UnboundedSender<Result<String, RealtimeError>>,
}

/// Opens links to a realtime endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Link, RealtimeError>;
}

/// Connector backed by a real WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Link, RealtimeError> {
        debug!(url = %url, "Connecting to WebSocket");

        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connection(format!("WebSocket connect failed: {}", e)))?;

        let (ws_sink, ws_stream) = ws.split();

        let frame_sink = ws_sink
            .sink_map_err(|e| RealtimeError::Connection(format!("Failed to send: {}", e)))
            .with(|frame: String| future::ready(Ok::<_, RealtimeError>(Message::Text(frame))));

        let frame_stream = ws_stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Server sent close frame");
                    None
                }
                // Pong is handled automatically by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(RealtimeError::Connection(format!("WebSocket error: {}", e)))),
            })
        });

        debug!(url = %url, "WebSocket connected");
        Ok(Link::new(frame_sink, frame_stream))
    }
}
