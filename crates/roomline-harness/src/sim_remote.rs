//! Scripted chat server.
//!
//! Speaks the frame protocol to one simulated client. Answers the handshake,
//! tracks joins, echoes sent messages to the joined room and answers pings.
//! Scripts inject live deliveries, notices and connection drops.

use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use roomline_app::TransportEvent;
use roomline_core::Timestamp;
use roomline_proto::{
    Frame, Payload,
    payloads::{
        ErrorPayload,
        chat::{ChatMessage, SystemNotice},
        session::HelloReply,
    },
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RemoteState {
    valid_tokens: HashSet<String>,
    echo: bool,
    connected: bool,
    username: Option<String>,
    joined: BTreeSet<String>,
    join_log: Vec<String>,
    inbound: VecDeque<TransportEvent>,
    sent: Vec<ChatMessage>,
    fail_opens: u32,
    opens: u32,
    next_session: u64,
}

impl RemoteState {
    fn push(&mut self, payload: Payload) {
        match payload.into_frame(0) {
            Ok(frame) => self.inbound.push_back(TransportEvent::Frame(frame)),
            Err(err) => warn!(error = %err, "sim remote failed to encode frame"),
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.username = None;
        self.joined.clear();
    }
}

/// Handle to the simulated server. Clones share state.
#[derive(Debug, Clone)]
pub struct SimRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for SimRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRemote {
    /// Server that accepts no tokens yet and echoes sent messages.
    pub fn new() -> Self {
        let state = RemoteState { echo: true, next_session: 1, ..RemoteState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept `token` in the handshake.
    #[must_use]
    pub fn accept_token(self, token: &str) -> Self {
        self.state().valid_tokens.insert(token.to_string());
        self
    }

    /// Stop echoing sent messages back to the sender.
    #[must_use]
    pub fn without_echo(self) -> Self {
        self.state().echo = false;
        self
    }

    /// Refuse the next `count` transport opens.
    pub fn fail_next_opens(&self, count: u32) {
        self.state().fail_opens = count;
    }

    /// Client opens the transport.
    ///
    /// # Errors
    ///
    /// Returns the refusal reason while scripted open failures remain.
    pub fn open(&self) -> Result<(), String> {
        let mut state = self.state();
        state.opens += 1;
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err("connection refused".to_string());
        }
        state.disconnect();
        state.inbound.clear();
        state.connected = true;
        Ok(())
    }

    /// Client closes the transport.
    pub fn close(&self) {
        let mut state = self.state();
        state.disconnect();
        state.inbound.clear();
    }

    /// Server drops the connection. The client sees `Closed { reason }`.
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state();
        if !state.connected {
            return;
        }
        debug!(reason, "sim remote dropping connection");
        state.disconnect();
        state.inbound.push_back(TransportEvent::Closed { reason: reason.to_string() });
    }

    /// Client sends a frame.
    pub fn receive(&self, frame: &Frame) {
        let mut state = self.state();
        if !state.connected {
            return;
        }
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(err) => {
                state.push(Payload::Error(ErrorPayload::invalid_payload(err.to_string())));
                return;
            },
        };

        match payload {
            Payload::Hello(hello) => {
                if state.valid_tokens.contains(&hello.auth_token) {
                    let session_id = state.next_session;
                    state.next_session += 1;
                    state.username = Some(hello.username);
                    state.push(Payload::HelloReply(HelloReply { session_id }));
                } else {
                    state.push(Payload::Error(ErrorPayload::unauthorized("invalid token")));
                }
            },
            Payload::JoinRoom(join) => {
                state.join_log.push(join.room.clone());
                state.joined.insert(join.room);
            },
            Payload::LeaveRoom(leave) => {
                state.joined.remove(&leave.room);
            },
            Payload::SendMessage(message) => {
                state.sent.push(message.clone());
                if state.echo && state.joined.contains(&message.room) {
                    state.push(Payload::MessageReceived(message));
                }
            },
            Payload::Ping => state.push(Payload::Pong),
            Payload::Goodbye(_) => state.disconnect(),
            other => {
                debug!(opcode = ?other.opcode(), "sim remote ignoring client frame");
            },
        }
    }

    /// Deliver a message from another user if the client joined `room`.
    ///
    /// Returns `true` if the message was queued for the client.
    pub fn deliver(&self, sender: &str, text: &str, room: &str, sent_at: Timestamp) -> bool {
        let mut state = self.state();
        if !state.connected || !state.joined.contains(room) {
            return false;
        }
        state.push(Payload::MessageReceived(ChatMessage {
            username: sender.to_string(),
            text: text.to_string(),
            room: room.to_string(),
            sent_at,
        }));
        true
    }

    /// Send a server notice for `room`.
    pub fn notice(&self, room: &str, text: &str) {
        let mut state = self.state();
        if state.connected {
            state.push(Payload::SystemNotice(SystemNotice {
                room: room.to_string(),
                text: text.to_string(),
            }));
        }
    }

    /// Next event waiting for the client.
    pub fn next_event(&self) -> Option<TransportEvent> {
        self.state().inbound.pop_front()
    }

    /// True while a transport is open.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Messages the client sent, in order.
    pub fn sent_messages(&self) -> Vec<ChatMessage> {
        self.state().sent.clone()
    }

    /// Every join the client issued, in order.
    pub fn join_log(&self) -> Vec<String> {
        self.state().join_log.clone()
    }

    /// Rooms the client is currently joined to.
    pub fn joined(&self) -> Vec<String> {
        self.state().joined.iter().cloned().collect()
    }

    /// Transport open attempts, successful or not.
    pub fn open_attempts(&self) -> u32 {
        self.state().opens
    }
}

#[cfg(test)]
mod tests {
    use roomline_proto::payloads::{
        chat::JoinRoom,
        session::{Goodbye, Hello},
    };

    use super::*;

    fn frame(payload: Payload) -> Frame {
        payload.into_frame(0).unwrap()
    }

    fn hello(token: &str) -> Frame {
        frame(Payload::Hello(Hello {
            version: 1,
            username: "alice".into(),
            auth_token: token.into(),
        }))
    }

    fn next_payload(remote: &SimRemote) -> Payload {
        match remote.next_event() {
            Some(TransportEvent::Frame(frame)) => Payload::from_frame(&frame).unwrap(),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn handshake_checks_token() {
        let remote = SimRemote::new().accept_token("good");
        remote.open().unwrap();

        remote.receive(&hello("bad"));
        assert!(matches!(next_payload(&remote), Payload::Error(e) if e.is_unauthorized()));

        remote.receive(&hello("good"));
        assert_eq!(next_payload(&remote), Payload::HelloReply(HelloReply { session_id: 1 }));
    }

    #[test]
    fn delivers_only_to_joined_rooms() {
        let remote = SimRemote::new().accept_token("t");
        remote.open().unwrap();
        let now = Timestamp::default();

        assert!(!remote.deliver("bob", "hi", "general", now));

        remote.receive(&frame(Payload::JoinRoom(JoinRoom {
            username: "alice".into(),
            room: "general".into(),
        })));
        assert!(remote.deliver("bob", "hi", "general", now));
        assert!(!remote.deliver("bob", "hi", "random", now));
        assert_eq!(remote.join_log(), ["general"]);
    }

    #[test]
    fn drop_forgets_joins_and_reports_close() {
        let remote = SimRemote::new().accept_token("t");
        remote.open().unwrap();
        remote.receive(&frame(Payload::JoinRoom(JoinRoom {
            username: "alice".into(),
            room: "general".into(),
        })));

        remote.drop_connection("reset");

        assert!(remote.joined().is_empty());
        assert_eq!(remote.next_event(), Some(TransportEvent::Closed { reason: "reset".into() }));
        assert!(!remote.is_connected());
    }

    #[test]
    fn scripted_open_failures() {
        let remote = SimRemote::new();
        remote.fail_next_opens(2);

        assert!(remote.open().is_err());
        assert!(remote.open().is_err());
        assert!(remote.open().is_ok());
        assert_eq!(remote.open_attempts(), 3);
    }

    #[test]
    fn goodbye_disconnects() {
        let remote = SimRemote::new();
        remote.open().unwrap();
        remote.receive(&frame(Payload::Goodbye(Goodbye { reason: "bye".into() })));
        assert!(!remote.is_connected());
    }
}
