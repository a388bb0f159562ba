//! Property-based tests for frame and payload encoding.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use roomline_proto::{
    Frame, FrameHeader, Opcode, Payload, ProtocolError,
    payloads::{chat::ChatMessage, chat::SystemNotice},
};

fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Hello),
        Just(Opcode::HelloReply),
        Just(Opcode::Goodbye),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
        Just(Opcode::JoinRoom),
        Just(Opcode::LeaveRoom),
        Just(Opcode::SendMessage),
        Just(Opcode::MessageReceived),
        Just(Opcode::SystemNotice),
        Just(Opcode::Error),
    ]
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_opcode(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(opcode, request_id, payload)| {
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            Frame::new(header, Bytes::from(payload))
        },
    )
}

fn arbitrary_message() -> impl Strategy<Value = ChatMessage> {
    ("[a-z]{1,12}", "\\PC{1,64}", "[a-z:]{1,24}", 0i64..4_000_000_000_000).prop_map(
        |(username, text, room, millis)| ChatMessage {
            username,
            text,
            room,
            sent_at: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
        },
    )
}

#[test]
fn prop_frame_encode_decode() {
    proptest!(|(frame in arbitrary_frame())| {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        prop_assert_eq!(buf.len(), frame.encoded_len());

        let decoded = Frame::decode(&buf).expect("decode should succeed");
        prop_assert_eq!(decoded, frame);
    });
}

#[test]
fn prop_decode_never_panics_on_garbage() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        let _ = Frame::decode(&bytes);
    });
}

#[test]
fn prop_truncation_is_detected() {
    proptest!(|(frame in arbitrary_frame(), cut in 1usize..64)| {
        prop_assume!(!frame.payload.is_empty());

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");
        let keep = buf.len().saturating_sub(cut.min(frame.payload.len()));
        buf.truncate(keep);

        let is_truncated = matches!(Frame::decode(&buf), Err(ProtocolError::FrameTruncated { .. }));
        prop_assert!(is_truncated);
    });
}

#[test]
fn prop_chat_payloads_survive_framing() {
    proptest!(|(message in arbitrary_message(), request_id in any::<u32>())| {
        let payload = Payload::MessageReceived(message);
        let frame = payload.clone().into_frame(request_id).expect("into_frame");

        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode");
        let decoded = Frame::decode(&buf).expect("decode");

        prop_assert_eq!(decoded.header.request_id(), request_id);
        prop_assert_eq!(Payload::from_frame(&decoded).expect("payload"), payload);
    });
}

#[test]
fn prop_system_notice_opcode_matches_variant() {
    proptest!(|(room in "[a-z]{1,16}", text in "\\PC{0,64}")| {
        let payload = Payload::SystemNotice(SystemNotice { room, text });
        let frame = payload.into_frame(0).expect("into_frame");

        prop_assert_eq!(frame.header.opcode_enum(), Some(Opcode::SystemNotice));
    });
}
