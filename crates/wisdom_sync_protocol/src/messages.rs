//! Protocol messages for sync.
//!
//! Every message is a plain serde struct; the wire form is CBOR. Messages
//! sent over a shared channel are wrapped in [`SyncMessage`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::event::SyncEvent;
use crate::PROTOCOL_VERSION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

macro_rules! cbor_message {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// Encodes to CBOR.
                pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
                    encode_cbor(self)
                }

                /// Decodes from CBOR.
                pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
                    decode_cbor(bytes)
                }
            }
        )*
    };
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Handshake request.
    HandshakeRequest(HandshakeRequest),
    /// Handshake response.
    HandshakeResponse(HandshakeResponse),
    /// Pull request.
    PullRequest(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
    /// Cursor acknowledgement.
    AckRequest(AckRequest),
    /// Acknowledgement response.
    AckResponse(AckResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::HandshakeRequest(_) => 1,
            SyncMessage::HandshakeResponse(_) => 2,
            SyncMessage::PullRequest(_) => 3,
            SyncMessage::PullResponse(_) => 4,
            SyncMessage::AckRequest(_) => 5,
            SyncMessage::AckResponse(_) => 6,
        }
    }
}

/// Handshake request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Client identifier.
    pub client_id: String,
    /// Protocol version.
    pub protocol_version: u16,
    /// Client's last durably applied cursor.
    pub last_cursor: i64,
}

impl HandshakeRequest {
    /// Creates a new handshake request.
    pub fn new(client_id: impl Into<String>, last_cursor: i64) -> Self {
        Self {
            client_id: client_id.into(),
            protocol_version: PROTOCOL_VERSION,
            last_cursor,
        }
    }
}

/// Handshake response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Whether handshake succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server's protocol version.
    pub protocol_version: u16,
    /// Highest seq currently in the server log.
    pub server_cursor: i64,
    /// The client's cursor is beyond anything this server has logged.
    pub cursor_ahead: bool,
}

impl HandshakeResponse {
    /// Creates a successful handshake response.
    pub fn success(server_cursor: i64, cursor_ahead: bool) -> Self {
        Self {
            success: true,
            error: None,
            protocol_version: PROTOCOL_VERSION,
            server_cursor,
            cursor_ahead,
        }
    }

    /// Creates a failed handshake response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            protocol_version: PROTOCOL_VERSION,
            server_cursor: 0,
            cursor_ahead: false,
        }
    }
}

/// Pull request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Return events with `seq` strictly greater than this.
    pub cursor: i64,
    /// Maximum number of events to return; 0 asks for the server default.
    pub limit: u32,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(cursor: i64, limit: u32) -> Self {
        Self { cursor, limit }
    }
}

/// Pull response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Events in strictly increasing `seq` order.
    pub events: Vec<SyncEvent>,
    /// Seq of the last event returned, or the request cursor when empty.
    pub new_cursor: i64,
    /// Whether more events exist after `new_cursor`.
    pub has_more: bool,
}

impl PullResponse {
    /// Creates a new pull response.
    pub fn new(events: Vec<SyncEvent>, new_cursor: i64, has_more: bool) -> Self {
        Self {
            events,
            new_cursor,
            has_more,
        }
    }

    /// Creates an empty response that leaves the cursor where it was.
    pub fn empty(cursor: i64) -> Self {
        Self::new(Vec::new(), cursor, false)
    }
}

/// Client acknowledgement of a durably applied cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    /// Client identifier.
    pub client_id: String,
    /// Highest seq the client has durably applied.
    pub cursor: i64,
}

impl AckRequest {
    /// Creates a new acknowledgement.
    pub fn new(client_id: impl Into<String>, cursor: i64) -> Self {
        Self {
            client_id: client_id.into(),
            cursor,
        }
    }
}

/// Server reply to an acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    /// Whether the acknowledgement was recorded.
    pub success: bool,
    /// Error message if rejected.
    pub error: Option<String>,
    /// Cursor the server recorded for this client.
    pub cursor: i64,
}

impl AckResponse {
    /// Creates a successful acknowledgement response.
    pub fn success(cursor: i64) -> Self {
        Self {
            success: true,
            error: None,
            cursor,
        }
    }

    /// Creates a rejected acknowledgement response.
    pub fn error(message: impl Into<String>, cursor: i64) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            cursor,
        }
    }
}

cbor_message!(
    SyncMessage,
    HandshakeRequest,
    HandshakeResponse,
    PullRequest,
    PullResponse,
    AckRequest,
    AckResponse,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EntityType, Operation};
    use serde_json::json;

    #[test]
    fn message_type_codes() {
        let pull = SyncMessage::PullRequest(PullRequest::new(0, 10));
        let ack = SyncMessage::AckResponse(AckResponse::success(4));
        assert_eq!(pull.type_code(), 3);
        assert_eq!(ack.type_code(), 6);
    }

    #[test]
    fn pull_response_carries_structured_payload() {
        let event = SyncEvent {
            seq: 3,
            entity_type: EntityType::Document,
            entity_id: "d1".into(),
            operation: Operation::Update,
            payload: json!({
                "doc_id": "d1",
                "metadata": {"tags": ["a", "b"], "weight": 2, "draft": false}
            }),
            created_at: 1_700_000_000_123,
        };
        let response = PullResponse::new(vec![event.clone()], 3, true);

        let bytes = SyncMessage::PullResponse(response).encode().unwrap();
        match SyncMessage::decode(&bytes).unwrap() {
            SyncMessage::PullResponse(decoded) => {
                assert_eq!(decoded.events, vec![event]);
                assert_eq!(decoded.new_cursor, 3);
                assert!(decoded.has_more);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn negative_cursor_survives_the_wire() {
        // Validation belongs to the server; the codec must not clamp.
        let bytes = PullRequest::new(-5, 10).encode().unwrap();
        assert_eq!(PullRequest::decode(&bytes).unwrap().cursor, -5);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(PullRequest::decode(&[0xff, 0x00, 0x13]).is_err());
    }

    #[test]
    fn handshake_defaults_to_current_version() {
        let request = HandshakeRequest::new("laptop", 12);
        assert_eq!(request.protocol_version, PROTOCOL_VERSION);
        let response = HandshakeResponse::error("nope");
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("nope"));
    }
}
