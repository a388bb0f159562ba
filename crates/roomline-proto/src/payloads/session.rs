//! Session management payloads.
//!
//! The handshake authenticates the client with its opaque credential before
//! any room traffic is accepted.

use serde::{Deserialize, Serialize};

/// Client handshake
///
/// First frame on every new connection. The server answers with
/// [`HelloReply`] or an error frame carrying
/// [`ErrorPayload::UNAUTHORIZED`](super::ErrorPayload::UNAUTHORIZED).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks
    pub version: u8,

    /// Authenticated username presented by the session provider
    pub username: String,

    /// Opaque credential token
    pub auth_token: String,
}

impl std::fmt::Debug for Hello {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hello")
            .field("version", &self.version)
            .field("username", &self.username)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Server acceptance of a [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned session identifier
    pub session_id: u64,
}

/// Graceful disconnect, sent by either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason
    pub reason: String,
}
