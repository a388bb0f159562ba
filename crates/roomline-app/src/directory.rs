//! Directory service seam.
//!
//! The directory answers request/response questions the real-time channel
//! does not: which rooms and users exist, room creation, and message history.

use async_trait::async_trait;
use roomline_core::{Message, Room, RoomId};
use thiserror::Error;

/// Errors returned by a [`Directory`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Room already exists
    #[error("room already exists: {0}")]
    Duplicate(String),

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential rejected
    #[error("unauthorized")]
    Unauthorized,

    /// Request could not be delivered or timed out
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body was malformed
    #[error("decode error: {0}")]
    Decode(String),
}

impl DirectoryError {
    /// True if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Request/response collaborator of the chat session.
///
/// Calls run concurrently with event handling; the runtime feeds their
/// results back into the session one at a time.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Ids of all public rooms.
    async fn list_rooms(&self) -> Result<Vec<RoomId>, DirectoryError>;

    /// Usernames of all registered users.
    async fn list_users(&self) -> Result<Vec<String>, DirectoryError>;

    /// Create a public room.
    async fn create_room(&self, name: &RoomId) -> Result<Room, DirectoryError>;

    /// Room history, oldest first.
    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<Message>, DirectoryError>;
}
