//! Fuzz target for ConnectionManager under hostile servers
//!
//! Drives a connection through the handshake, then interleaves arbitrary
//! frames, transport losses and clock jumps.
//!
//! # Invariants
//!
//! - Never panics on any frame or ordering
//! - Only the state machine's own rooms are ever joined
//! - A failed connection stays failed until `connect` is called again

#![no_main]

use std::{ops::Sub, time::Duration};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use roomline_core::{ConnectionManager, ConnectionState, Credential, RoomId, SessionContext};
use roomline_proto::{Frame, FrameHeader, Opcode, Payload, payloads::session::HelloReply};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ms(u64);

impl Sub for Ms {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

#[derive(Debug, Arbitrary)]
enum Step {
    Frame { opcode: u16, request_id: u32, payload: Vec<u8> },
    Join(bool),
    Lost,
    Opened,
    Advance(u16),
    Tick,
}

fuzz_target!(|steps: Vec<Step>| {
    let session = SessionContext::new("alice", Credential::new("tok"));
    let mut conn = ConnectionManager::new(Default::default(), 7);
    let mut now = 0u64;

    let _ = conn.connect(&session, Ms(now));
    let _ = conn.transport_opened(Ms(now));
    if let Ok(reply) = Payload::HelloReply(HelloReply { session_id: 1 }).into_frame(1) {
        let _ = conn.handle_frame(&reply, Ms(now));
    }

    let rooms = [RoomId::from_remote("general"), RoomId::from_remote("random")];

    for step in steps {
        let failed_before = matches!(conn.state(), ConnectionState::Failed { .. });
        match step {
            Step::Frame { opcode, request_id, payload } => {
                let opcode = Opcode::from_u16(opcode).unwrap_or(Opcode::Error);
                let mut header = FrameHeader::new(opcode);
                header.set_request_id(request_id);
                let frame = Frame::new(header, Bytes::from(payload));
                let _ = conn.handle_frame(&frame, Ms(now));
            },
            Step::Join(first) => {
                let _ = conn.join_room(&rooms[usize::from(!first)]);
            },
            Step::Lost => {
                let _ = conn.transport_failed("fuzz", Ms(now));
            },
            Step::Opened => {
                let _ = conn.transport_opened(Ms(now));
            },
            Step::Advance(ms) => now += u64::from(ms),
            Step::Tick => {
                let _ = conn.tick(Ms(now));
            },
        }

        for room in conn.joined_rooms() {
            assert!(rooms.contains(room), "joined unknown room {room}");
        }
        if failed_before {
            assert!(matches!(conn.state(), ConnectionState::Failed { .. }));
        }
        conn.events().for_each(drop);
    }
});
