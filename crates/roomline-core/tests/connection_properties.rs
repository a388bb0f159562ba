//! Property tests for the connection lifecycle under arbitrary inputs.

use std::{ops::Sub, time::Duration};

use proptest::prelude::*;
use roomline_core::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
    Credential, RoomId, SessionContext,
};
use roomline_proto::{
    Payload,
    payloads::{
        ErrorPayload,
        session::{Goodbye, HelloReply},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ms(u64);

impl Sub for Ms {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Opened,
    Failed,
    Reply,
    Goodbye,
    Forbidden,
    Join(u8),
    Close,
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Connect),
        Just(Op::Opened),
        Just(Op::Failed),
        Just(Op::Reply),
        Just(Op::Goodbye),
        Just(Op::Forbidden),
        (0u8..3).prop_map(Op::Join),
        Just(Op::Close),
        (0u64..40_000).prop_map(Op::Advance),
    ]
}

fn apply(conn: &mut ConnectionManager<Ms>, now: &mut u64, op: &Op) -> Vec<ConnectionAction> {
    let session = SessionContext::new("alice", Credential::new("tok1"));
    let t = Ms(*now);
    let mut inbound =
        |payload: Payload| conn.handle_frame(&payload.into_frame(0).unwrap(), t).unwrap_or_default();

    match op {
        Op::Reply => inbound(Payload::HelloReply(HelloReply { session_id: 1 })),
        Op::Goodbye => inbound(Payload::Goodbye(Goodbye { reason: "bye".into() })),
        Op::Forbidden => inbound(Payload::Error(ErrorPayload::forbidden_room("x"))),
        Op::Connect => conn.connect(&session, t).unwrap_or_default(),
        Op::Opened => conn.transport_opened(t).unwrap_or_default(),
        Op::Failed => conn.transport_failed("lost", t),
        Op::Join(n) => conn.join_room(&RoomId::from_remote(format!("room-{n}"))),
        Op::Close => conn.close(),
        Op::Advance(ms) => {
            *now += ms;
            conn.tick(Ms(*now))
        },
    }
}

proptest! {
    #[test]
    fn close_always_silences_the_connection(ops in prop::collection::vec(op(), 0..64)) {
        let mut conn = ConnectionManager::new(ConnectionConfig::default(), 11);
        let mut now = 0;

        for op in &ops {
            apply(&mut conn, &mut now, op);
        }

        conn.close();
        prop_assert_eq!(conn.state(), &ConnectionState::Disconnected);
        prop_assert_eq!(conn.events().count(), 0);
        prop_assert_eq!(conn.joined_rooms().count(), 0);
    }

    #[test]
    fn reconnect_attempts_respect_ceiling(ops in prop::collection::vec(op(), 0..128)) {
        let config = ConnectionConfig::default();
        let ceiling = config.reconnect.max_attempts;
        let mut conn = ConnectionManager::new(config, 5);
        let mut now = 0;

        for op in &ops {
            apply(&mut conn, &mut now, op);
            if let ConnectionState::Reconnecting { attempt } = conn.state() {
                prop_assert!(*attempt >= 1 && *attempt <= ceiling);
            }
        }
    }

    #[test]
    fn joins_only_sent_while_connected(ops in prop::collection::vec(op(), 0..64)) {
        let mut conn = ConnectionManager::new(ConnectionConfig::default(), 3);
        let mut now = 0;

        for op in &ops {
            let connected_before = conn.is_connected();
            let actions = apply(&mut conn, &mut now, op);

            let sent_join = actions.iter().any(|action| matches!(
                action,
                ConnectionAction::SendFrame(frame)
                    if matches!(Payload::from_frame(frame), Ok(Payload::JoinRoom(_)))
            ));
            if sent_join {
                prop_assert!(connected_before);
            }
        }
    }

    #[test]
    fn restored_only_follows_failed(ops in prop::collection::vec(op(), 0..96)) {
        let mut conn = ConnectionManager::new(ConnectionConfig::default(), 9);
        let mut now = 0;
        let mut lost = false;

        for op in &ops {
            if matches!(op, Op::Close) {
                lost = false;
            }
            apply(&mut conn, &mut now, op);
            for event in conn.events() {
                match event {
                    ConnectionEvent::ConnectionFailed { .. } => lost = true,
                    ConnectionEvent::ConnectionRestored => {
                        prop_assert!(lost);
                        lost = false;
                    },
                    _ => {},
                }
            }
        }
    }
}
