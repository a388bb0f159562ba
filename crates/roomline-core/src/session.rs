//! Session context: who is logged in and with what credential.
//!
//! Created at login and destroyed at logout. Everything else in a chat
//! session is scoped to its lifetime.

use std::fmt;

use zeroize::Zeroizing;

/// Opaque credential token.
///
/// Zeroed on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Wrap a token. `None` if the token is blank.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = Zeroizing::new(token.into());
        if token.trim().is_empty() { None } else { Some(Self(token)) }
    }

    /// Token value, for the handshake only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Authenticated identity supplied by the session provider.
#[derive(Clone)]
pub struct SessionContext {
    username: String,
    credential: Option<Credential>,
}

impl SessionContext {
    /// Create a context at login.
    ///
    /// A context without a credential is allowed to exist (the provider may
    /// not have one yet) but cannot connect.
    #[must_use]
    pub fn new(username: impl Into<String>, credential: Option<Credential>) -> Self {
        Self { username: username.into(), credential }
    }

    /// Logged-in username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Credential, if the provider supplied one.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// End the session (logout). The credential is zeroed as it drops.
    pub fn destroy(self) {
        tracing::debug!(username = %self.username, "session context destroyed");
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
