//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads are CBOR. The header opcode selects
//! the payload type, so only the inner struct is serialized (no variant tag).
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode, enforced by match
//! exhaustiveness in [`Payload::opcode`] and [`Payload::decode`].

pub mod chat;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session management
    /// Client handshake
    Hello(session::Hello),
    /// Server handshake acceptance
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Keepalive request
    Ping,
    /// Keepalive response
    Pong,

    // Client commands
    /// Subscribe to a room
    JoinRoom(chat::JoinRoom),
    /// Unsubscribe from a room
    LeaveRoom(chat::LeaveRoom),
    /// Publish a message
    SendMessage(chat::ChatMessage),

    // Server events
    /// Message delivered to a joined room
    MessageReceived(chat::ChatMessage),
    /// Server notice for a room
    SystemNotice(chat::SystemNotice),

    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Credential missing, expired or rejected. Fatal to the connection.
    pub const UNAUTHORIZED: u16 = 0x0001;
    /// Client may not join or post to the room (malformed direct-room id,
    /// not a participant).
    pub const FORBIDDEN_ROOM: u16 = 0x0002;
    /// Payload could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x0003;
    /// Server-side failure.
    pub const INTERNAL: u16 = 0x0004;

    /// Create an authentication failure.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self { code: Self::UNAUTHORIZED, message: reason.into() }
    }

    /// Create a forbidden-room error.
    pub fn forbidden_room(room: &str) -> Self {
        Self { code: Self::FORBIDDEN_ROOM, message: format!("forbidden room: {room}") }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self { code: Self::INTERNAL, message: msg.into() }
    }

    /// True if this error ends the session rather than a single request.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.code == Self::UNAUTHORIZED
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::LeaveRoom(_) => Opcode::LeaveRoom,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::MessageReceived(_) => Opcode::MessageReceived,
            Self::SystemNotice(_) => Opcode::SystemNotice,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to buffer.
    ///
    /// Serializes only the inner struct. Size limits are enforced later by
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping | Self::Pong => Ok(()), // zero-byte payloads
            Self::JoinRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LeaveRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendMessage(inner) | Self::MessageReceived(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::SystemNotice(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload bytes for the given opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed the frame limit
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::JoinRoom => Self::JoinRoom(cbor(bytes)?),
            Opcode::LeaveRoom => Self::LeaveRoom(cbor(bytes)?),
            Opcode::SendMessage => Self::SendMessage(cbor(bytes)?),
            Opcode::MessageReceived => Self::MessageReceived(cbor(bytes)?),
            Opcode::SystemNotice => Self::SystemNotice(cbor(bytes)?),
            Opcode::Error => Self::Error(cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame tagged with `request_id`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, request_id: u32) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        let mut header = FrameHeader::new(self.opcode());
        header.set_request_id(request_id);
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unrecognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn ping_has_empty_payload() {
        let frame = Payload::Ping.into_frame(7).expect("frame");
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Ping));
        assert_eq!(frame.header.request_id(), 7);
        assert!(frame.payload.is_empty());
        assert_eq!(Payload::from_frame(&frame), Ok(Payload::Ping));
    }

    #[test]
    fn send_and_receive_share_body_but_not_opcode() {
        let body = chat::ChatMessage {
            username: "alice".to_string(),
            text: "hi".to_string(),
            room: "general".to_string(),
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid date"),
        };

        let sent = Payload::SendMessage(body.clone()).into_frame(0).expect("frame");
        let echoed = Payload::MessageReceived(body.clone()).into_frame(0).expect("frame");

        assert_eq!(sent.payload, echoed.payload);
        assert_eq!(Payload::from_frame(&sent), Ok(Payload::SendMessage(body.clone())));
        assert_eq!(Payload::from_frame(&echoed), Ok(Payload::MessageReceived(body)));
    }

    #[test]
    fn opcode_and_payload_mismatch_fails_to_decode() {
        let frame = Payload::Goodbye(session::Goodbye { reason: "bye".to_string() })
            .into_frame(0)
            .expect("frame");

        assert!(matches!(
            Payload::decode(Opcode::SendMessage, &frame.payload),
            Err(ProtocolError::CborDecode(_))
        ));
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[6..8].copy_from_slice(&0x0ABCu16.to_be_bytes());
        let frame = Frame::decode(&bytes).expect("framing is valid");

        assert_eq!(Payload::from_frame(&frame), Err(ProtocolError::UnknownOpcode(0x0ABC)));
    }

    #[test]
    fn hello_debug_redacts_token() {
        let hello = session::Hello {
            version: FrameHeader::VERSION,
            username: "alice".to_string(),
            auth_token: "tok1".to_string(),
        };
        let rendered = format!("{hello:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("tok1"));
    }

    #[test]
    fn error_classification() {
        assert!(ErrorPayload::unauthorized("expired").is_unauthorized());
        assert!(!ErrorPayload::forbidden_room("dm:a").is_unauthorized());
        assert_eq!(ErrorPayload::forbidden_room("dm:a").message, "forbidden room: dm:a");
    }
}
