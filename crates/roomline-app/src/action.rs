//! Session side effects.

use roomline_core::{ConnectionAction, ConnectionState, RoomId};

use crate::{ActivationTicket, SessionError};

/// Actions produced by the chat session for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Real-time channel operation
    Transport(ConnectionAction),

    /// Fetch room history; answer with `SessionEvent::SnapshotLoaded`
    FetchSnapshot {
        /// Room to fetch
        room: RoomId,
        /// Activation requesting it
        ticket: ActivationTicket,
    },

    /// Create a room; answer with `SessionEvent::RoomCreated`
    CreateRoom {
        /// Validated room name
        name: RoomId,
    },

    /// List rooms; answer with `SessionEvent::RoomsListed`
    ListRooms,

    /// List users; answer with `SessionEvent::UsersListed`
    ListUsers,

    /// Tell presentation code something happened
    Notify(SessionNotice),
}

/// Status and error notices for presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Connection state changed
    StateChanged(ConnectionState),

    /// A room became active
    RoomActivated(RoomId),

    /// Something failed; the session carries on
    Error(SessionError),
}
