//! Realtime Authentication
//!
//! Single responsibility: Present credentials to the server and wait for the
//! namespace to be opened.
//!
//! # Handshake Flow
//!
//! 1. **Engine.IO open** - the server sends `0{"sid":..}` right after the upgrade
//! 2. **Namespace connect** - we send `40{"token":..,"userType":..}`
//! 3. **Ack or refusal**
//!    - `40{"sid":..}` means the socket is connected
//!    - `44{"message":..}` means the server rejected the credentials
//!
//! Pings that arrive before the ack are answered so a slow server does not
//! drop us mid-handshake.

use std::fmt;
use std::str::FromStr;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::protocol::{decode, encode, OpenInfo, Packet};
use super::transport::Link;
use crate::error::RealtimeError;

/// Which side of the marketplace the session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Customer,
    Supplier,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Customer => "customer",
            UserType::Supplier => "supplier",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(UserType::Customer),
            "supplier" => Ok(UserType::Supplier),
            other => Err(RealtimeError::Config(format!(
                "Unknown user type '{}' (expected customer or supplier)",
                other
            ))),
        }
    }
}

/// The handshake payload: an opaque auth token plus the user type.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    token: String,
    user_type: UserType,
}

impl Credentials {
    pub fn new(token: impl Into<String>, user_type: UserType) -> Self {
        Self {
            token: token.into(),
            user_type,
        }
    }

    pub fn user_type(&self) -> UserType {
        self.user_type
    }
}

// Never log the token.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_type", &self.user_type)
            .finish()
    }
}

/// What the server told us while opening the socket.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub open: OpenInfo,
    /// Socket id from the namespace ack, if the server sent one.
    pub socket_id: Option<String>,
}

/// Run the handshake on a freshly opened link.
///
/// Callers bound this with their own timeout.
pub async fn authenticate(
    link: &mut Link,
    credentials: &Credentials,
    namespace: &str,
) -> Result<Handshake, RealtimeError> {
    let open = loop {
        match decode(&next_frame(link).await?)? {
            Packet::Open(info) => break info,
            Packet::Ping => send(link, &Packet::Pong).await?,
            other => debug!(packet = ?other, "Ignoring frame before open"),
        }
    };
    debug!(sid = %open.sid, "Engine open received");

    let connect = Packet::Connect {
        namespace: namespace.to_string(),
        data: Some(serde_json::to_value(credentials)?),
    };
    send(link, &connect).await?;
    debug!(user_type = %credentials.user_type, "Sent namespace connect");

    loop {
        match decode(&next_frame(link).await?)? {
            Packet::Connect { namespace: ns, data } if ns == namespace => {
                let socket_id = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(|sid| sid.as_str())
                    .map(str::to_string);
                return Ok(Handshake { open, socket_id });
            }
            Packet::ConnectError { namespace: ns, message } if ns == namespace => {
                return Err(RealtimeError::Auth(message));
            }
            Packet::Ping => send(link, &Packet::Pong).await?,
            Packet::Close => {
                return Err(RealtimeError::Connection("Server closed during handshake".into()))
            }
            other => debug!(packet = ?other, "Ignoring frame during handshake"),
        }
    }
}

async fn next_frame(link: &mut Link) -> Result<String, RealtimeError> {
    link.stream
        .next()
        .await
        .ok_or_else(|| RealtimeError::Connection("Connection closed during handshake".into()))?
}

async fn send(link: &mut Link, packet: &Packet) -> Result<(), RealtimeError> {
    link.sink.send(encode(packet)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    #[test]
    fn test_credentials_payload_shape() {
        let creds = Credentials::new("secret", UserType::Supplier);
        let json = serde_json::to_string(&creds).unwrap();
        assert_eq!(json, r#"{"token":"secret","userType":"supplier"}"#);
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_user_type_parse() {
        assert_eq!("Customer".parse::<UserType>().unwrap(), UserType::Customer);
        assert_eq!("supplier".parse::<UserType>().unwrap(), UserType::Supplier);
        assert!("admin".parse::<UserType>().is_err());
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let (mut link, mut peer) = Link::channel();
        peer.inbound.send(Ok(OPEN.to_string())).unwrap();
        peer.inbound.send(Ok("2".to_string())).unwrap();
        peer.inbound.send(Ok(r#"40{"sid":"s1"}"#.to_string())).unwrap();

        let creds = Credentials::new("tok", UserType::Customer);
        let handshake = authenticate(&mut link, &creds, "/").await.unwrap();

        assert_eq!(handshake.open.sid, "e1");
        assert_eq!(handshake.socket_id.as_deref(), Some("s1"));
        assert_eq!(
            peer.sent.recv().await.as_deref(),
            Some(r#"40{"token":"tok","userType":"customer"}"#)
        );
        assert_eq!(peer.sent.recv().await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let (mut link, peer) = Link::channel();
        peer.inbound.send(Ok(OPEN.to_string())).unwrap();
        peer.inbound
            .send(Ok(r#"44{"message":"invalid token"}"#.to_string()))
            .unwrap();

        let creds = Credentials::new("bad", UserType::Customer);
        let err = authenticate(&mut link, &creds, "/").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Auth(ref m) if m == "invalid token"));
    }

    #[tokio::test]
    async fn test_authenticate_connection_closed() {
        let (mut link, peer) = Link::channel();
        drop(peer);

        let creds = Credentials::new("tok", UserType::Customer);
        let err = authenticate(&mut link, &creds, "/").await.unwrap_err();
        assert!(matches!(err, RealtimeError::Connection(_)));
    }
}
