//! Session input events.
//!
//! Everything that happens to a [`crate::ChatSession`] other than direct user
//! commands: transport callbacks, inbound frames, clock ticks and completed
//! directory requests.

use roomline_core::{Message, Room, RoomId};
use roomline_proto::Frame;

use crate::DirectoryError;

/// Identifies one room activation.
///
/// A snapshot fetch carries the ticket of the activation that requested it;
/// results for any other ticket are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivationTicket(pub(crate) u64);

impl ActivationTicket {
    /// Raw sequence number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Events processed by the chat session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport requested by `Open` is up
    TransportOpened,

    /// Transport failed to open or was lost
    TransportClosed {
        /// Failure description
        reason: String,
    },

    /// Inbound frame from the server
    Frame(Frame),

    /// Periodic tick
    Tick,

    /// History fetch completed
    SnapshotLoaded {
        /// Room the fetch was for
        room: RoomId,
        /// Activation that requested it
        ticket: ActivationTicket,
        /// History, oldest first
        result: Result<Vec<Message>, DirectoryError>,
    },

    /// Room creation completed
    RoomCreated {
        /// Requested room
        name: RoomId,
        /// Created room
        result: Result<Room, DirectoryError>,
    },

    /// Room listing completed
    RoomsListed(Result<Vec<RoomId>, DirectoryError>),

    /// User listing completed
    UsersListed(Result<Vec<String>, DirectoryError>),
}
