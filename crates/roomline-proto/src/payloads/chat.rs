//! Room subscription and message payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscribe to a room's live events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Joining user
    pub username: String,
    /// Room identifier (public name or derived direct-room id)
    pub room: String,
}

/// Unsubscribe from a room's live events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoom {
    /// Leaving user
    pub username: String,
    /// Room identifier
    pub room: String,
}

/// Chat message body
///
/// Used for both directions: `SendMessage` carries it from the client and
/// `MessageReceived` carries the server's echo to every joined client,
/// including the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub username: String,
    /// Message text, trimmed and non-empty
    pub text: String,
    /// Target room
    pub room: String,
    /// Author's wall-clock time when the message was composed
    pub sent_at: DateTime<Utc>,
}

/// Server notice scoped to one room (joins, departures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    /// Room the notice belongs to
    pub room: String,
    /// Notice text
    pub text: String,
}
