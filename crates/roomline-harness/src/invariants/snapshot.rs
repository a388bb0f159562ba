//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live state so every check in
//! one pass sees the same moment.

use std::collections::BTreeMap;

use roomline_app::ChatSession;
use roomline_core::{ConnectionState, Environment, Message, RoomId};
use roomline_proto::payloads::chat::ChatMessage;

/// Snapshot of one session plus what the remote observed from it.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// Session's username.
    pub username: String,
    /// Connection state.
    pub state: ConnectionState,
    /// Currently active room.
    pub active_room: Option<RoomId>,
    /// Room store contents, in store order.
    pub rooms: Vec<RoomId>,
    /// Every message log, by room.
    pub logs: BTreeMap<RoomId, Vec<Message>>,
    /// Rooms the connection manager believes it joined.
    pub joined: Vec<RoomId>,
    /// Messages the remote received from this session.
    pub outbound: Vec<ChatMessage>,
}

impl SystemSnapshot {
    /// Empty, disconnected snapshot for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: ConnectionState::Disconnected,
            active_room: None,
            rooms: Vec::new(),
            logs: BTreeMap::new(),
            joined: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Capture `session` along with the messages the remote received.
    pub fn capture<E: Environment>(session: &ChatSession<E>, outbound: Vec<ChatMessage>) -> Self {
        let logs = session
            .reconciler()
            .rooms()
            .map(|room| (room.clone(), session.log(room).to_vec()))
            .collect();

        Self {
            username: session.username().to_string(),
            state: session.connection_state().clone(),
            active_room: session.active_room().cloned(),
            rooms: session.rooms().list_rooms().iter().map(|room| room.id.clone()).collect(),
            logs,
            joined: session.joined_rooms().cloned().collect(),
            outbound,
        }
    }

    /// Log for `room`, empty if none.
    pub fn log(&self, room: &RoomId) -> &[Message] {
        self.logs.get(room).map(Vec::as_slice).unwrap_or_default()
    }
}
