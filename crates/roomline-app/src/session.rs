//! Chat session state machine.
//!
//! [`ChatSession`] is the composition root: it owns the connection manager,
//! room store and message reconciler of one logged-in user and sequences
//! them. Like the connection manager it performs no I/O. User commands and
//! [`SessionEvent`]s go in, [`SessionAction`]s come out.
//!
//! # Room activation
//!
//! ```text
//! activate_room(R) ──> set_active(R) ──> FetchSnapshot{R, ticket}
//!                                               │
//!               SnapshotLoaded{R, ticket} <─────┘
//!                         │
//!                         v
//!               load_snapshot(R) ──> join_room(R)
//! ```
//!
//! The join is never issued before the snapshot for the same activation has
//! been loaded. Snapshot results carrying an older ticket are dropped.
//!
//! # Reconnect
//!
//! The connection manager forgets joins on loss. On `ConnectionRestored` the
//! session re-joins the active room only.

use std::sync::Arc;

use roomline_core::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
    DirectRoomResolver, Environment, Message, OutgoingMessage, Room, RoomError, RoomId,
    SessionContext,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    ActivationTicket, DirectoryError, MessageReconciler, RoomStore, SessionAction, SessionError,
    SessionEvent, SessionNotice,
};

/// The activation whose snapshot results are still wanted.
#[derive(Debug, Clone)]
struct Activation {
    room: RoomId,
    ticket: ActivationTicket,
    loaded: bool,
}

/// State of one logged-in user's chat session.
///
/// Generic over [`Environment`] so simulation can supply virtual time.
#[derive(Debug)]
pub struct ChatSession<E: Environment> {
    env: E,
    context: SessionContext,
    connection: ConnectionManager<E::Instant>,
    rooms: RoomStore,
    reconciler: MessageReconciler,
    users: Vec<String>,
    activation: Option<Activation>,
    next_ticket: u64,
}

impl<E: Environment> ChatSession<E> {
    /// Create a disconnected session for `context`.
    pub fn new(env: E, context: SessionContext, config: ConnectionConfig) -> Self {
        let connection = ConnectionManager::new(config, env.random_u64());
        Self {
            env,
            context,
            connection,
            rooms: RoomStore::new(),
            reconciler: MessageReconciler::new(),
            users: Vec::new(),
            activation: None,
            next_ticket: 0,
        }
    }

    /// Environment the session reads time from.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Logged-in username.
    pub fn username(&self) -> &str {
        self.context.username()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    /// Rooms joined on the current connection.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.connection.joined_rooms()
    }

    /// Known rooms.
    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    /// Message logs.
    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    /// The room's log.
    pub fn log(&self, room: &RoomId) -> &[Message] {
        self.reconciler.log(room)
    }

    /// Active room, if any.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.rooms.active()
    }

    /// Other users known to the directory.
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Subscribe to the ordered room list.
    pub fn subscribe_rooms(&self) -> watch::Receiver<Arc<[Room]>> {
        self.rooms.subscribe()
    }

    /// Subscribe to a room's log.
    pub fn subscribe_log(&mut self, room: &RoomId) -> watch::Receiver<Arc<[Message]>> {
        self.reconciler.subscribe(room)
    }

    /// Start connecting with the session's credential.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::MissingCredential` if the context carries none
    /// - `ConnectionError::InvalidState` if already connecting or connected
    pub fn connect(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        let before = self.connection.state().clone();
        let actions = self.connection.connect(&self.context, self.env.now())?;
        Ok(self.settle(&before, actions))
    }

    /// Close the channel. No connection event is delivered afterwards.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        let before = self.connection.state().clone();
        let actions = self.connection.close();
        self.settle(&before, actions)
    }

    /// End the session. Returns the teardown actions for the channel.
    pub fn logout(mut self) -> Vec<SessionAction> {
        let actions = self.disconnect();
        info!(username = self.context.username(), "logged out");
        self.context.destroy();
        actions
    }

    /// Make `room` active: fetch its snapshot, then join it once loaded.
    ///
    /// The previously active room is left. Any snapshot still in flight for
    /// an earlier activation is discarded when it arrives.
    ///
    /// # Errors
    ///
    /// - `RoomError::UnknownRoom` if `room` is not in the store
    pub fn activate_room(&mut self, room: &RoomId) -> Result<Vec<SessionAction>, SessionError> {
        self.rooms.set_active(room)?;

        let before = self.connection.state().clone();
        let mut actions = Vec::new();
        if let Some(previous) = self.activation.take() {
            actions.extend(self.connection.leave_room(&previous.room));
        }

        let ticket = ActivationTicket(self.next_ticket);
        self.next_ticket += 1;
        self.activation = Some(Activation { room: room.clone(), ticket, loaded: false });
        info!(%room, ticket = ticket.get(), "room activated");

        let mut out = self.settle(&before, actions);
        out.push(SessionAction::Notify(SessionNotice::RoomActivated(room.clone())));
        out.push(SessionAction::FetchSnapshot { room: room.clone(), ticket });
        Ok(out)
    }

    /// Send `text` to the active room.
    ///
    /// The log is not touched: the message appears once the server echoes it.
    /// If the channel is down the failure comes back as a notice.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if `text` is blank
    /// - `RoomError::UnknownRoom` if no room is active
    pub fn compose_and_send(&mut self, text: &str) -> Result<Vec<SessionAction>, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::InvalidInput("message text is empty".into()).into());
        }
        let Some(room) = self.rooms.active().cloned() else {
            return Err(RoomError::UnknownRoom("no active room".into()).into());
        };

        let message = OutgoingMessage {
            sender: self.context.username().to_string(),
            text: text.to_string(),
            room,
            sent_at: self.env.wall_clock(),
        };

        let before = self.connection.state().clone();
        let actions = self.connection.send(&message);
        Ok(self.settle(&before, actions))
    }

    /// Ask the directory to create a public room.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if the name is blank or reserved
    /// - `RoomError::DuplicateRoom` if the room is already known
    pub fn create_room(&mut self, name: &str) -> Result<Vec<SessionAction>, SessionError> {
        let id = self.rooms.check_new(name)?;
        Ok(vec![SessionAction::CreateRoom { name: id }])
    }

    /// Open the direct room with `other` and activate it.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if `other` is blank, contains the
    ///   delimiter, or is the session's own username
    pub fn start_direct(&mut self, other: &str) -> Result<Vec<SessionAction>, SessionError> {
        let id = DirectRoomResolver::resolve(self.context.username(), other)?;
        self.rooms.add_direct(id.clone())?;
        self.activate_room(&id)
    }

    /// Re-fetch room and user lists.
    pub fn refresh_directory(&self) -> Vec<SessionAction> {
        vec![SessionAction::ListRooms, SessionAction::ListUsers]
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        let before = self.connection.state().clone();
        let now = self.env.now();

        match event {
            SessionEvent::TransportOpened => match self.connection.transport_opened(now) {
                Ok(actions) => self.settle(&before, actions),
                Err(err) => vec![notify_error(err)],
            },
            SessionEvent::TransportClosed { reason } => {
                let actions = self.connection.transport_failed(&reason, now);
                self.settle(&before, actions)
            },
            SessionEvent::Frame(frame) => match self.connection.handle_frame(&frame, now) {
                Ok(actions) => self.settle(&before, actions),
                Err(err) => {
                    warn!(error = %err, "inbound frame rejected");
                    let mut out = self.settle(&before, Vec::new());
                    out.push(notify_error(err));
                    out
                },
            },
            SessionEvent::Tick => {
                let actions = self.connection.tick(now);
                self.settle(&before, actions)
            },
            SessionEvent::SnapshotLoaded { room, ticket, result } => {
                self.on_snapshot(&before, &room, ticket, result)
            },
            SessionEvent::RoomCreated { name, result } => match result {
                Ok(room) => match self.rooms.add_room(room.id.as_str()) {
                    Ok(room) => {
                        info!(room = %room.id, "room created");
                        Vec::new()
                    },
                    Err(err) => {
                        warn!(room = %room.id, error = %err, "created room not registered");
                        vec![notify_error(err)]
                    },
                },
                Err(err) => {
                    warn!(room = %name, error = %err, "room creation failed");
                    vec![notify_error(err)]
                },
            },
            SessionEvent::RoomsListed(result) => self.on_rooms_listed(result),
            SessionEvent::UsersListed(result) => match result {
                Ok(users) => {
                    let me = self.context.username();
                    self.users = users.into_iter().filter(|user| user != me).collect();
                    debug!(count = self.users.len(), "users listed");
                    Vec::new()
                },
                Err(err) => vec![notify_error(err)],
            },
        }
    }

    fn on_snapshot(
        &mut self,
        before: &ConnectionState,
        room: &RoomId,
        ticket: ActivationTicket,
        result: Result<Vec<Message>, DirectoryError>,
    ) -> Vec<SessionAction> {
        let current = self
            .activation
            .as_mut()
            .filter(|activation| activation.ticket == ticket && &activation.room == room);
        let Some(activation) = current else {
            warn!(%room, ticket = ticket.get(), "stale snapshot dropped");
            return Vec::new();
        };
        activation.loaded = true;

        let mut out = Vec::new();
        let messages = match result {
            Ok(messages) => messages,
            Err(err) => {
                warn!(%room, error = %err, "snapshot fetch failed, starting from an empty log");
                out.push(notify_error(err));
                Vec::new()
            },
        };
        self.reconciler.load_snapshot(room, messages);

        let actions = self.connection.join_room(room);
        let mut settled = self.settle(before, actions);
        settled.append(&mut out);
        settled
    }

    fn on_rooms_listed(&mut self, result: Result<Vec<RoomId>, DirectoryError>) -> Vec<SessionAction> {
        let ids = match result {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "room listing failed");
                return vec![notify_error(err)];
            },
        };

        let first = ids.first().cloned();
        self.rooms.seed_public(ids);

        match first {
            Some(room) if self.rooms.active().is_none() => {
                self.activate_room(&room).unwrap_or_else(|err| vec![notify_error(err)])
            },
            _ => Vec::new(),
        }
    }

    /// Convert connection actions, then react to any connection events they
    /// produced. Appends a state notice if the connection state moved.
    fn settle(
        &mut self,
        before: &ConnectionState,
        actions: Vec<ConnectionAction>,
    ) -> Vec<SessionAction> {
        let mut out: Vec<SessionAction> = actions.into_iter().map(session_action).collect();

        let events: Vec<ConnectionEvent> = self.connection.events().collect();
        for event in events {
            out.extend(self.on_connection_event(event).into_iter().map(session_action));
        }

        if self.connection.state() != before {
            out.push(SessionAction::Notify(SessionNotice::StateChanged(
                self.connection.state().clone(),
            )));
        }
        out
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) -> Vec<ConnectionAction> {
        match event {
            ConnectionEvent::Established { session_id } => {
                info!(session_id, username = self.context.username(), "session established");
                self.join_active()
            },
            ConnectionEvent::MessageReceived(message) => {
                self.reconciler.apply_live(message);
                Vec::new()
            },
            ConnectionEvent::SystemNotice { room, text } => {
                self.reconciler.apply_system_notice(&room, &text, self.env.wall_clock());
                Vec::new()
            },
            ConnectionEvent::ConnectionFailed { reason } => {
                self.notice_active(&format!("connection lost: {reason}"));
                Vec::new()
            },
            ConnectionEvent::ConnectionRestored => {
                self.notice_active("reconnected");
                self.join_active()
            },
        }
    }

    /// Join the active room if its snapshot for this activation is in.
    fn join_active(&mut self) -> Vec<ConnectionAction> {
        let room = self
            .activation
            .as_ref()
            .filter(|activation| activation.loaded)
            .map(|activation| activation.room.clone());

        match room {
            Some(room) => self.connection.join_room(&room),
            None => Vec::new(),
        }
    }

    fn notice_active(&mut self, text: &str) {
        if let Some(room) = self.rooms.active().cloned() {
            self.reconciler.apply_system_notice(&room, text, self.env.wall_clock());
        }
    }
}

fn session_action(action: ConnectionAction) -> SessionAction {
    match action {
        ConnectionAction::ReportError(err) => notify_error(err),
        other => SessionAction::Transport(other),
    }
}

fn notify_error(err: impl Into<SessionError>) -> SessionAction {
    SessionAction::Notify(SessionNotice::Error(err.into()))
}
