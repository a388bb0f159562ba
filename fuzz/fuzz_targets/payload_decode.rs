//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR under every opcode: malformed maps, wrong payload
//! type for the opcode, oversized strings. Must return an error, never panic.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use roomline_proto::{Frame, FrameHeader, Opcode, Payload};

const OPCODES: [Opcode; 11] = [
    Opcode::Hello,
    Opcode::HelloReply,
    Opcode::Goodbye,
    Opcode::Ping,
    Opcode::Pong,
    Opcode::JoinRoom,
    Opcode::LeaveRoom,
    Opcode::SendMessage,
    Opcode::MessageReceived,
    Opcode::SystemNotice,
    Opcode::Error,
];

fuzz_target!(|data: &[u8]| {
    for opcode in OPCODES {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));
        let _ = Payload::from_frame(&frame);
    }
});
