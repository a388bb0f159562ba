//! Real-time channel lifecycle.
//!
//! Owns connect, handshake, liveness, reconnect and room subscription state
//! for the single channel of a chat session. Uses the action pattern: methods
//! take time as input and return actions for the driver to execute, so the
//! machine performs no I/O and can be driven by a virtual clock.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐ HelloReply ┌───────────┐
//! │ Disconnected │────────>│ Connecting │───────────>│ Connected │<──┐
//! └──────────────┘         └────────────┘            └───────────┘   │
//!        ^                       │ failure                 │ loss    │ HelloReply
//!        └───────────────────────┘                         v         │
//!                                                  ┌──────────────┐  │
//!                         ┌────────┐  ceiling hit  │ Reconnecting │──┘
//!                         │ Failed │<──────────────│  (backoff)   │
//!                         └────────┘               └──────────────┘
//! ```
//!
//! `close()` returns to `Disconnected` from every state. `Failed` is left only
//! by an explicit `connect`.
//!
//! # Room subscriptions
//!
//! The server forgets joins when a connection drops, so the joined set lives
//! per connection and is cleared on loss. The manager never rejoins on its
//! own: it emits [`ConnectionEvent::ConnectionRestored`] and the session
//! decides which room to join.

use std::{
    collections::{BTreeSet, VecDeque},
    ops::Sub,
    time::{Duration, Instant},
};

use roomline_proto::{
    Frame, FrameHeader, Payload,
    payloads::{
        ErrorPayload,
        chat::{ChatMessage, JoinRoom, LeaveRoom},
        session::{Goodbye, Hello},
    },
};
use tracing::{debug, info, warn};

use crate::{
    error::ConnectionError,
    message::{Message, Origin, OutgoingMessage},
    room::RoomId,
    session::{Credential, SessionContext},
};

/// Time allowed to open the transport and complete the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time without inbound traffic before the connection counts as lost.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which Ping frames are sent while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Side effects requested by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport to the server. Answer with
    /// [`ConnectionManager::transport_opened`] or
    /// [`ConnectionManager::transport_failed`].
    Open {
        /// Credential presented for this connection
        credential: Credential,
    },

    /// Send this frame to the server
    SendFrame(Frame),

    /// Tear down the current transport, if any
    Close {
        /// Reason for closing
        reason: String,
    },

    /// Local error callback. Never fatal to the session.
    ReportError(ConnectionError),
}

/// Typed events delivered to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed on the first connection after `connect`
    Established {
        /// Server-assigned session id
        session_id: u64,
    },

    /// Live message for a joined room
    MessageReceived(Message),

    /// Server notice for a room
    SystemNotice {
        /// Room the notice belongs to
        room: RoomId,
        /// Notice text
        text: String,
    },

    /// Connection lost; reconnecting in the background
    ConnectionFailed {
        /// Why the connection was lost
        reason: String,
    },

    /// Connection re-established after a loss. Room joins must be re-issued.
    ConnectionRestored,
}

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and none requested
    Disconnected,
    /// First connection after `connect` in progress
    Connecting,
    /// Handshake complete
    Connected,
    /// Lost a connection; retrying with backoff
    Reconnecting {
        /// 1-based number of the retry being waited on or in progress
        attempt: u32,
    },
    /// Gave up. Requires an explicit `connect`.
    Failed {
        /// Last failure
        reason: String,
    },
}

/// Exponential backoff for reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay
    pub max_delay: Duration,
    /// Retries before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// Doubles per attempt up to `max_delay`, then adds up to 25% jitter
    /// picked by `entropy`.
    #[must_use]
    pub fn delay(&self, attempt: u32, entropy: u64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base = self.initial_delay.saturating_mul(1 << exponent).min(self.max_delay);

        let spread = base.as_millis() as u64 / 4;
        let jitter = if spread == 0 { 0 } else { entropy % (spread + 1) };
        base + Duration::from_millis(jitter)
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for opening the transport and completing the handshake
    pub handshake_timeout: Duration,
    /// Silence tolerated while connected
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < `idle_timeout` / 2)
    pub heartbeat_interval: Duration,
    /// Retry schedule after a loss
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Progress of the current transport.
#[derive(Debug, Clone, Copy)]
enum Link<I> {
    Idle,
    Opening { since: I },
    Handshaking { since: I },
    Up,
    Backoff { since: I, delay: Duration },
}

/// Username and credential captured at `connect`, reused for reconnects.
#[derive(Debug, Clone)]
struct Identity {
    username: String,
    credential: Credential,
}

/// Connection lifecycle state machine.
///
/// Generic over `Instant` so simulations can use virtual time.
#[derive(Debug)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    link: Link<I>,
    identity: Option<Identity>,
    session_id: Option<u64>,
    last_activity: Option<I>,
    last_heartbeat: Option<I>,
    joined: BTreeSet<RoomId>,
    events: VecDeque<ConnectionEvent>,
    generation: u64,
    next_request_id: u32,
    jitter_state: u64,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`].
    ///
    /// `jitter_seed` seeds the backoff jitter sequence.
    pub fn new(config: ConnectionConfig, jitter_seed: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            link: Link::Idle,
            identity: None,
            session_id: None,
            last_activity: None,
            last_heartbeat: None,
            joined: BTreeSet::new(),
            events: VecDeque::new(),
            generation: 0,
            next_request_id: 1,
            jitter_state: jitter_seed,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// True once the handshake has completed on the current transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Session id from the last `HelloReply`.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Incremented by every `close()`. Events and frames never cross it.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rooms joined on the current connection.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.joined.iter()
    }

    /// Start connecting with the session's credential.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::MissingCredential` if the context has none; no
    ///   action is produced
    /// - `ConnectionError::InvalidState` unless `Disconnected` or `Failed`
    pub fn connect(
        &mut self,
        session: &SessionContext,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let Some(credential) = session.credential() else {
            return Err(ConnectionError::MissingCredential);
        };

        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Failed { .. }) {
            return Err(ConnectionError::InvalidState {
                state: self.state.clone(),
                operation: "connect",
            });
        }

        info!(username = session.username(), "connecting");

        self.identity = Some(Identity {
            username: session.username().to_string(),
            credential: credential.clone(),
        });
        self.transition(ConnectionState::Connecting);
        self.link = Link::Opening { since: now };

        Ok(vec![ConnectionAction::Open { credential: credential.clone() }])
    }

    /// The transport requested by `Open` is up. Sends `Hello`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if no transport was being opened
    pub fn transport_opened(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let (Link::Opening { .. }, Some(identity)) = (self.link, self.identity.as_ref()) else {
            return Err(ConnectionError::InvalidState {
                state: self.state.clone(),
                operation: "transport_opened",
            });
        };

        let hello = Payload::Hello(Hello {
            version: FrameHeader::VERSION,
            username: identity.username.clone(),
            auth_token: identity.credential.expose().to_string(),
        });
        let frame = hello.into_frame(self.request_id())?;

        self.link = Link::Handshaking { since: now };
        debug!(state = ?self.state, "transport open, hello sent");

        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// The transport could not be opened or was lost.
    ///
    /// Ignored while `Disconnected` or `Failed`.
    pub fn transport_failed(&mut self, reason: &str, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => Vec::new(),
            _ => self.lose(reason.to_string(), now),
        }
    }

    /// Periodic maintenance: timeouts, heartbeats and reconnect scheduling.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.link {
            Link::Idle => Vec::new(),

            Link::Opening { since } | Link::Handshaking { since } => {
                let elapsed = now - since;
                if elapsed > self.config.handshake_timeout {
                    self.lose(format!("handshake timeout after {elapsed:?}"), now)
                } else {
                    Vec::new()
                }
            },

            Link::Up => {
                let idle = self.last_activity.map_or(Duration::ZERO, |last| now - last);
                if idle > self.config.idle_timeout {
                    return self.lose(format!("idle timeout after {idle:?}"), now);
                }

                let heartbeat_due = self
                    .last_heartbeat
                    .is_none_or(|last| now - last >= self.config.heartbeat_interval);
                if !heartbeat_due {
                    return Vec::new();
                }

                self.last_heartbeat = Some(now);
                self.frame_action(Payload::Ping)
            },

            Link::Backoff { since, delay } => {
                if now - since < delay {
                    return Vec::new();
                }
                let Some(identity) = self.identity.as_ref() else {
                    return Vec::new();
                };

                info!(state = ?self.state, "reconnect attempt");
                let credential = identity.credential.clone();
                self.link = Link::Opening { since: now };
                vec![ConnectionAction::Open { credential }]
            },
        }
    }

    /// Process an inbound frame.
    ///
    /// Frames arriving while `Disconnected` or `Failed` belong to a closed
    /// connection and are ignored.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the opcode is not valid now
    /// - `ConnectionError::Protocol` if the payload does not decode
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if matches!(self.state, ConnectionState::Disconnected | ConnectionState::Failed { .. }) {
            debug!(opcode = frame.header.opcode(), "frame after close ignored");
            return Ok(Vec::new());
        }

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(self.unexpected(frame));
        };
        if opcode.is_client_command() {
            return Err(self.unexpected(frame));
        }

        self.last_activity = Some(now);
        let payload = Payload::from_frame(frame)?;

        match (self.link, payload) {
            (Link::Handshaking { .. }, Payload::HelloReply(reply)) => {
                self.session_id = Some(reply.session_id);
                self.link = Link::Up;
                self.last_heartbeat = Some(now);

                let restored = matches!(self.state, ConnectionState::Reconnecting { .. });
                self.transition(ConnectionState::Connected);

                if restored {
                    info!(session_id = reply.session_id, "connection restored");
                    self.events.push_back(ConnectionEvent::ConnectionRestored);
                } else {
                    info!(session_id = reply.session_id, "connected");
                    self.events
                        .push_back(ConnectionEvent::Established { session_id: reply.session_id });
                }
                Ok(Vec::new())
            },

            (_, Payload::Error(error)) if error.is_unauthorized() => {
                warn!(message = %error.message, "credential rejected");
                Ok(self.fail(ConnectionError::Authentication(error.message)))
            },

            (Link::Handshaking { .. } | Link::Up, Payload::Goodbye(goodbye)) => {
                Ok(self.lose(format!("server goodbye: {}", goodbye.reason), now))
            },

            (Link::Up, Payload::Error(ErrorPayload { code, message })) => {
                warn!(code, %message, "server rejected a command");
                Ok(vec![ConnectionAction::ReportError(ConnectionError::Rejected { code, message })])
            },

            (Link::Up, Payload::Ping) => Ok(self.frame_action(Payload::Pong)),

            (Link::Up, Payload::Pong) => Ok(Vec::new()),

            (Link::Up, Payload::MessageReceived(message)) => {
                self.events.push_back(ConnectionEvent::MessageReceived(live_message(message)));
                Ok(Vec::new())
            },

            (Link::Up, Payload::SystemNotice(notice)) => {
                self.events.push_back(ConnectionEvent::SystemNotice {
                    room: RoomId::from_remote(notice.room),
                    text: notice.text,
                });
                Ok(Vec::new())
            },

            _ => Err(self.unexpected(frame)),
        }
    }

    /// Publish a message. Best effort: no acknowledgment is awaited.
    ///
    /// Never fails synchronously; problems come back as
    /// [`ConnectionAction::ReportError`].
    pub fn send(&mut self, message: &OutgoingMessage) -> Vec<ConnectionAction> {
        if !self.is_connected() {
            debug!(room = %message.room, state = ?self.state, "send while not connected");
            return vec![ConnectionAction::ReportError(ConnectionError::NotConnected)];
        }

        self.frame_action(Payload::SendMessage(ChatMessage {
            username: message.sender.clone(),
            text: message.text.clone(),
            room: message.room.as_str().to_string(),
            sent_at: message.sent_at,
        }))
    }

    /// Ask the server for `room`'s live events. Idempotent per connection.
    ///
    /// A no-op while not connected: joins do not survive a connection, so the
    /// session re-issues them after `ConnectionRestored`.
    pub fn join_room(&mut self, room: &RoomId) -> Vec<ConnectionAction> {
        if !self.is_connected() {
            debug!(%room, state = ?self.state, "join deferred until connected");
            return Vec::new();
        }
        if self.joined.contains(room) {
            return Vec::new();
        }
        let Some(username) = self.identity.as_ref().map(|identity| identity.username.clone())
        else {
            return Vec::new();
        };

        let actions =
            self.frame_action(Payload::JoinRoom(JoinRoom { username, room: room.to_string() }));
        if matches!(actions.as_slice(), [ConnectionAction::SendFrame(_)]) {
            debug!(%room, "joined");
            self.joined.insert(room.clone());
        }
        actions
    }

    /// Stop receiving `room`'s live events. No-op if not joined.
    pub fn leave_room(&mut self, room: &RoomId) -> Vec<ConnectionAction> {
        if !self.is_connected() || !self.joined.remove(room) {
            return Vec::new();
        }
        let Some(username) = self.identity.as_ref().map(|identity| identity.username.clone())
        else {
            return Vec::new();
        };

        debug!(%room, "left");
        self.frame_action(Payload::LeaveRoom(LeaveRoom { username, room: room.to_string() }))
    }

    /// Drain events buffered since the last call.
    pub fn events(&mut self) -> std::collections::vec_deque::Drain<'_, ConnectionEvent> {
        self.events.drain(..)
    }

    /// Tear down from any state.
    ///
    /// Buffered events are discarded and the generation advances: once this
    /// returns, no event of the closed connection is delivered.
    pub fn close(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.is_connected() {
            actions.extend(
                self.frame_action(Payload::Goodbye(Goodbye { reason: "client closed".into() })),
            );
        }
        if !matches!(self.link, Link::Idle | Link::Backoff { .. }) {
            actions.push(ConnectionAction::Close { reason: "client closed".to_string() });
        }

        self.reset_link();
        self.events.clear();
        self.generation += 1;
        self.transition(ConnectionState::Disconnected);

        actions
    }

    fn lose(&mut self, reason: String, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if !matches!(self.link, Link::Idle | Link::Backoff { .. }) {
            actions.push(ConnectionAction::Close { reason: reason.clone() });
        }
        self.reset_link();

        let attempt = match self.state {
            ConnectionState::Connecting => {
                warn!(%reason, "connect failed");
                self.transition(ConnectionState::Disconnected);
                actions.push(ConnectionAction::ReportError(ConnectionError::Transport(reason)));
                return actions;
            },
            ConnectionState::Connected => {
                warn!(%reason, "connection lost");
                self.events.push_back(ConnectionEvent::ConnectionFailed { reason: reason.clone() });
                1
            },
            ConnectionState::Reconnecting { attempt } => attempt + 1,
            ConnectionState::Disconnected | ConnectionState::Failed { .. } => return actions,
        };

        if attempt > self.config.reconnect.max_attempts {
            warn!(%reason, attempts = attempt - 1, "giving up on reconnect");
            actions.extend(self.fail(ConnectionError::Transport(reason)));
            return actions;
        }

        let entropy = self.next_entropy();
        let delay = self.config.reconnect.delay(attempt, entropy);
        warn!(attempt, ?delay, %reason, "reconnect scheduled");
        self.link = Link::Backoff { since: now, delay };
        self.transition(ConnectionState::Reconnecting { attempt });

        actions
    }

    fn fail(&mut self, error: ConnectionError) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if !matches!(self.link, Link::Idle | Link::Backoff { .. }) {
            actions.push(ConnectionAction::Close { reason: error.to_string() });
        }
        self.reset_link();
        self.transition(ConnectionState::Failed { reason: error.to_string() });
        actions.push(ConnectionAction::ReportError(error));
        actions
    }

    fn unexpected(&self, frame: &Frame) -> ConnectionError {
        ConnectionError::UnexpectedFrame { state: self.state.clone(), opcode: frame.header.opcode() }
    }

    fn reset_link(&mut self) {
        self.link = Link::Idle;
        self.joined.clear();
        self.last_activity = None;
        self.last_heartbeat = None;
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "connection state");
            self.state = next;
        }
    }

    fn frame_action(&mut self, payload: Payload) -> Vec<ConnectionAction> {
        let request_id = self.request_id();
        match payload.into_frame(request_id) {
            Ok(frame) => vec![ConnectionAction::SendFrame(frame)],
            Err(err) => vec![ConnectionAction::ReportError(err.into())],
        }
    }

    fn request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    // splitmix64
    fn next_entropy(&mut self) -> u64 {
        self.jitter_state = self.jitter_state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.jitter_state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

fn live_message(message: ChatMessage) -> Message {
    Message {
        sender: message.username,
        text: message.text,
        room: RoomId::from_remote(message.room),
        sent_at: message.sent_at,
        origin: Origin::Live,
    }
}
