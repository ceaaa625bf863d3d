//! Room Membership
//!
//! A chat room is one customer quote thread on one RFQ. Membership lives on the
//! server; the client only emits join/leave requests and keeps no member set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite room key. Scoping is enforced server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomKey {
    pub quote_id: i64,
    pub customer_quote_id: i64,
}

impl RoomKey {
    pub fn new(quote_id: i64, customer_quote_id: i64) -> Self {
        Self {
            quote_id,
            customer_quote_id,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rfq:{}:{}", self.quote_id, self.customer_quote_id)
    }
}

/// Payload of `send-rfq-message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    #[serde(flatten)]
    pub room: RoomKey,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_key_wire_shape() {
        let key = RoomKey::new(7, 42);
        assert_eq!(
            serde_json::to_value(key).unwrap(),
            json!({ "quoteId": 7, "customerQuoteId": 42 })
        );
        assert_eq!(key.to_string(), "rfq:7:42");
    }

    #[test]
    fn test_room_message_flattens_key() {
        let msg = RoomMessage {
            room: RoomKey::new(1, 2),
            message: "Can you do 500 units?".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "quoteId": 1, "customerQuoteId": 2, "message": "Can you do 500 units?" })
        );
    }
}
