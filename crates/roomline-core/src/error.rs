//! Error types for the chat core.
//!
//! Connection errors classify into authentication failures (fatal, never
//! retried), transient transport failures (retried with backoff), and caller
//! or peer bugs. Room errors are data-shape problems returned synchronously to
//! the caller.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors raised by the connection lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Asked to connect without a credential. Checked before any network
    /// round trip.
    #[error("no credential supplied")]
    MissingCredential,

    /// Server rejected the credential
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport could not be established or was lost
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation not valid in the current state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received a frame the current state does not accept
    #[error("unexpected frame: opcode {opcode:#06x} while {state:?}")]
    UnexpectedFrame {
        /// State when the frame arrived
        state: ConnectionState,
        /// Raw opcode of the frame
        opcode: u16,
    },

    /// Outgoing intent dropped because the channel is not connected
    #[error("not connected")]
    NotConnected,

    /// Server answered a command with an error frame
    #[error("rejected by server ({code:#06x}): {message}")]
    Rejected {
        /// Protocol error code
        code: u16,
        /// Server-provided message
        message: String,
    },

    /// Frame encoding or decoding failed
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ConnectionError {
    /// True if the error may clear up on its own and is worth retrying.
    ///
    /// Only transport failures qualify. Authentication failures and protocol
    /// violations never do.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }

    /// True if the error concerns the credential itself.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Authentication(_))
    }
}

impl From<roomline_proto::ProtocolError> for ConnectionError {
    fn from(err: roomline_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors raised by room identifiers and the room registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Malformed name or username
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A public room with this name already exists
    #[error("room already exists: {0}")]
    DuplicateRoom(String),

    /// Room is not registered
    #[error("unknown room: {0}")]
    UnknownRoom(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(ConnectionError::Transport("reset".to_string()).is_transient());
        assert!(ConnectionError::NotConnected.is_transient());
    }

    #[test]
    fn credential_errors_are_fatal() {
        for err in [ConnectionError::MissingCredential, ConnectionError::Authentication("x".into())]
        {
            assert!(err.is_authentication());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn protocol_violations_are_not_retried() {
        let err = ConnectionError::UnexpectedFrame {
            state: ConnectionState::Disconnected,
            opcode: 0x0200,
        };
        assert!(!err.is_transient());
        assert!(!err.is_authentication());
        assert!(!ConnectionError::Protocol("bad cbor".into()).is_transient());
    }
}
