//! Socket.IO Wire Protocol
//!
//! Single responsibility: Encode and decode Socket.IO v4 packets carried in
//! Engine.IO v4 text frames over a WebSocket.
//!
//! # Wire Format
//!
//! Every WebSocket text frame is one Engine.IO packet. The first character is
//! the Engine.IO packet type:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open (server -> client, once)
//! 1                               close
//! 2                               ping (server -> client)
//! 3                               pong (client -> server)
//! 4<socket.io packet>             message
//! 6                               noop
//! ```
//!
//! A Socket.IO packet inside an Engine.IO message:
//!
//! ```text
//! <type>[/namespace,][ack id][json]
//!
//! 0  connect        40{"token":"..","userType":"customer"}
//! 1  disconnect     41
//! 2  event          42["join-rfq-room",{"quoteId":7,"customerQuoteId":42}]
//! 4  connect_error  44{"message":"Authentication error"}
//! ```
//!
//! The default namespace `/` is never written out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::RealtimeError;

/// The namespace every socket joins unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO handshake data sent by the server right after the upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// How long the link may stay silent before it is considered dead:
    /// one ping interval plus the ping timeout. `None` if the server did
    /// not announce a heartbeat.
    pub fn heartbeat_window(&self) -> Option<Duration> {
        let window = self.ping_interval.saturating_add(self.ping_timeout);
        if window == 0 {
            None
        } else {
            Some(Duration::from_millis(window))
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        data: Value,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

impl Packet {
    /// Build an event packet from any serializable payload.
    pub fn event<T: Serialize>(namespace: &str, name: &str, payload: &T) -> Result<Self, RealtimeError> {
        Ok(Packet::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

/// Encode a packet into a single text frame.
pub fn encode(packet: &Packet) -> Result<String, RealtimeError> {
    let frame = match packet {
        Packet::Open(info) => format!("0{}", serde_json::to_string(info)?),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Connect { namespace, data } => {
            let body = match data {
                Some(value) => serde_json::to_string(value)?,
                None => String::new(),
            };
            format!("40{}{}", namespace_prefix(namespace), body)
        }
        Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
        Packet::Event { namespace, name, data } => {
            let mut args = vec![Value::String(name.clone())];
            if !data.is_null() {
                args.push(data.clone());
            }
            format!(
                "42{}{}",
                namespace_prefix(namespace),
                serde_json::to_string(&Value::Array(args))?
            )
        }
        Packet::ConnectError { namespace, message } => format!(
            "44{}{}",
            namespace_prefix(namespace),
            serde_json::to_string(&serde_json::json!({ "message": message }))?
        ),
    };
    Ok(frame)
}

/// Decode a single text frame.
pub fn decode(frame: &str) -> Result<Packet, RealtimeError> {
    let kind = *frame
        .as_bytes()
        .first()
        .ok_or_else(|| RealtimeError::Protocol("Empty frame".into()))?;

    match kind {
        b'0' => Ok(Packet::Open(serde_json::from_str(&frame[1..])?)),
        b'1' => Ok(Packet::Close),
        b'2' => Ok(Packet::Ping),
        b'3' => Ok(Packet::Pong),
        b'4' => decode_socket_packet(&frame[1..]),
        b'6' => Ok(Packet::Noop),
        other => Err(RealtimeError::Protocol(format!(
            "Unknown engine packet type: {}",
            other as char
        ))),
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, RealtimeError> {
    let kind = *body
        .as_bytes()
        .first()
        .ok_or_else(|| RealtimeError::Protocol("Empty socket packet".into()))?;
    if !kind.is_ascii_digit() {
        return Err(RealtimeError::Protocol(format!(
            "Invalid socket packet type: {}",
            kind as char
        )));
    }

    let (namespace, rest) = split_namespace(&body[1..]);

    // Ack ids are not requested by this client; skip them if present.
    let ack_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    let rest = &rest[ack_len..];

    match kind {
        b'0' => {
            let data = if rest.is_empty() {
                None
            } else {
                Some(serde_json::from_str(rest)?)
            };
            Ok(Packet::Connect { namespace, data })
        }
        b'1' => Ok(Packet::Disconnect { namespace }),
        b'2' => {
            let (name, data) = decode_event_args(rest)?;
            Ok(Packet::Event { namespace, name, data })
        }
        b'4' => {
            let message = if rest.is_empty() {
                "Connection refused".to_string()
            } else {
                match serde_json::from_str::<Value>(rest)? {
                    Value::String(message) => message,
                    Value::Object(map) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("Connection refused")
                        .to_string(),
                    other => other.to_string(),
                }
            };
            Ok(Packet::ConnectError { namespace, message })
        }
        other => Err(RealtimeError::Protocol(format!(
            "Unsupported socket packet type: {}",
            other as char
        ))),
    }
}

/// Split an optional `/namespace,` prefix off a socket packet body.
fn split_namespace(body: &str) -> (String, &str) {
    if !body.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), body);
    }
    match body.find(',') {
        Some(idx) => (body[..idx].to_string(), &body[idx + 1..]),
        None => (body.to_string(), ""),
    }
}

fn decode_event_args(json: &str) -> Result<(String, Value), RealtimeError> {
    let mut args = match serde_json::from_str::<Value>(json)? {
        Value::Array(args) => args.into_iter(),
        _ => return Err(RealtimeError::Protocol("Event payload is not an array".into())),
    };

    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(RealtimeError::Protocol("Event is missing its name".into())),
    };

    Ok((name, args.next().unwrap_or(Value::Null)))
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
            .unwrap();
        match packet {
            Packet::Open(info) => {
                assert_eq!(info.sid, "abc");
                assert_eq!(info.ping_interval, 25000);
                assert_eq!(info.max_payload, Some(1_000_000));
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_window() {
        let info: OpenInfo =
            serde_json::from_str(r#"{"sid":"a","pingInterval":25000,"pingTimeout":20000}"#).unwrap();
        assert_eq!(info.heartbeat_window(), Some(Duration::from_millis(45_000)));

        let silent: OpenInfo = serde_json::from_str(r#"{"sid":"a"}"#).unwrap();
        assert_eq!(silent.heartbeat_window(), None);
    }

    #[test]
    fn test_heartbeat_frames() {
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(encode(&Packet::Pong).unwrap(), "3");
    }

    #[test]
    fn test_encode_connect_with_auth() {
        let packet = Packet::Connect {
            namespace: "/".into(),
            data: Some(json!({ "token": "t0k", "userType": "supplier" })),
        };
        assert_eq!(encode(&packet).unwrap(), r#"40{"token":"t0k","userType":"supplier"}"#);

        let packet = Packet::Connect {
            namespace: "/rfq".into(),
            data: None,
        };
        assert_eq!(encode(&packet).unwrap(), "40/rfq,");
    }

    #[test]
    fn test_decode_connect_ack() {
        assert_eq!(
            decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                namespace: "/".into(),
                data: Some(json!({ "sid": "xyz" })),
            }
        );
        assert_eq!(
            decode(r#"40/rfq,{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                namespace: "/rfq".into(),
                data: Some(json!({ "sid": "xyz" })),
            }
        );
    }

    #[test]
    fn test_event_frames() {
        let packet = Packet::event("/", "typing-start", &json!({ "quoteId": 1, "customerQuoteId": 2 })).unwrap();
        assert_eq!(
            encode(&packet).unwrap(),
            r#"42["typing-start",{"customerQuoteId":2,"quoteId":1}]"#
        );

        let decoded = decode(r#"42/rfq,17["user-left",{"user":{"id":3}}]"#).unwrap();
        assert_eq!(
            decoded,
            Packet::Event {
                namespace: "/rfq".into(),
                name: "user-left".into(),
                data: json!({ "user": { "id": 3 } }),
            }
        );

        let bare = decode(r#"42["ping-room"]"#).unwrap();
        assert!(matches!(bare, Packet::Event { data: Value::Null, .. }));
    }

    #[test]
    fn test_decode_connect_error() {
        assert_eq!(
            decode(r#"44{"message":"invalid token"}"#).unwrap(),
            Packet::ConnectError {
                namespace: "/".into(),
                message: "invalid token".into(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("4x").is_err());
        assert!(decode(r#"42{"not":"an array"}"#).is_err());
        assert!(decode("42[7]").is_err());
    }
}
