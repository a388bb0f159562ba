//! Message log entries and outgoing intents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::room::RoomId;

/// Wall-clock timestamp carried by messages.
pub type Timestamp = DateTime<Utc>;

/// Sender name used for locally synthesized notices.
pub const SYSTEM_SENDER: &str = "system";

/// Where a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Delivered over the real-time channel
    Live,
    /// Part of a fetched history snapshot
    Snapshot,
    /// Synthesized locally; never sent to the remote
    System,
}

/// One entry in a room's message log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Author username, or [`SYSTEM_SENDER`]
    pub sender: String,
    /// Message text
    pub text: String,
    /// Room the message belongs to
    pub room: RoomId,
    /// Author's timestamp (local receipt time for system notices)
    pub sent_at: Timestamp,
    /// Provenance
    pub origin: Origin,
}

impl Message {
    /// Synthesize a system notice.
    #[must_use]
    pub fn system(room: RoomId, text: impl Into<String>, received_at: Timestamp) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            text: text.into(),
            room,
            sent_at: received_at,
            origin: Origin::System,
        }
    }

    /// Identity used for duplicate detection: sender, text and timestamp.
    #[must_use]
    pub fn dedup_key(&self) -> (&str, &str, Timestamp) {
        (&self.sender, &self.text, self.sent_at)
    }

    /// Same message with a different provenance.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// A locally composed message on its way to the remote.
///
/// Not a log entry: the log only gains the message when the server echoes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Author (the session's username)
    pub sender: String,
    /// Trimmed, non-empty text
    pub text: String,
    /// Target room
    pub room: RoomId,
    /// Composition time
    pub sent_at: Timestamp,
}
