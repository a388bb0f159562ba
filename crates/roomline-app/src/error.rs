//! Session and runtime errors.

use roomline_core::{ConnectionError, RoomError};
use thiserror::Error;

use crate::DirectoryError;

/// Errors surfaced to presentation code by the chat session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Connection lifecycle error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Room or input validation error
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Directory request failed
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl SessionError {
    /// True if the user can fix the problem by changing their input.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::Room(RoomError::DuplicateRoom(_) | RoomError::InvalidInput(_))
                | Self::Directory(DirectoryError::Duplicate(_))
        )
    }
}

/// Errors that end the runtime loop.
#[derive(Error, Debug)]
pub enum RuntimeError<E>
where
    E: std::error::Error + 'static,
{
    /// Driver I/O failed
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// Session could not start
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}
