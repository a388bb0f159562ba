//! Room identifiers.
//!
//! Public rooms are identified by their (trimmed) name. Direct rooms are
//! identified by an id derived from the two participants:
//!
//! ```text
//! dm:<lesser username>:<greater username>
//! ```
//!
//! The `dm:` namespace is reserved, so no public room name can collide with a
//! derived id. This encoding is shared with the server, which splits on `:` to
//! authorize joins; changing it is a protocol change.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoomError;

/// Opaque room identifier, unique within a room store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validate a user-chosen public room name.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if the name is blank or uses the reserved
    ///   direct-room namespace
    pub fn public(name: &str) -> Result<Self, RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidInput("room name is empty".to_string()));
        }
        if name.starts_with(DirectRoomResolver::PREFIX) {
            return Err(RoomError::InvalidInput(format!(
                "room name may not start with {:?}",
                DirectRoomResolver::PREFIX
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Wrap an identifier received from the server or directory.
    ///
    /// Not validated: the remote is the authority on ids it hands out.
    #[must_use]
    pub fn from_remote(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id lives in the direct-room namespace.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.0.starts_with(DirectRoomResolver::PREFIX)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    /// Named room anyone can join
    Public,
    /// Two-party room with a derived id
    Direct,
}

/// Room known to the client. Holds identity only, never message content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    /// Unique identifier
    pub id: RoomId,
    /// Public or direct
    pub kind: RoomKind,
}

impl Room {
    /// A room whose kind follows from its id's namespace.
    #[must_use]
    pub fn classify(id: RoomId) -> Self {
        let kind = if id.is_direct() { RoomKind::Direct } else { RoomKind::Public };
        Self { id, kind }
    }

    /// Label for display to `me`.
    ///
    /// Direct rooms show the other participant; public rooms their name.
    #[must_use]
    pub fn display_name<'a>(&'a self, me: &str) -> &'a str {
        match self.kind {
            RoomKind::Public => self.id.as_str(),
            RoomKind::Direct => {
                DirectRoomResolver::other_participant(&self.id, me).unwrap_or(self.id.as_str())
            },
        }
    }
}

/// Derives canonical direct-room ids.
///
/// `resolve(a, b) == resolve(b, a)` for every valid pair, and the result
/// depends on nothing but the two usernames.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRoomResolver;

impl DirectRoomResolver {
    /// Namespace tag reserved for direct rooms.
    pub const PREFIX: &'static str = "dm:";

    /// Separator between the two participants.
    pub const DELIMITER: char = ':';

    /// Derive the room id for a pair of users.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if either username is blank or contains
    ///   the delimiter, or if both name the same user
    pub fn resolve(user_a: &str, user_b: &str) -> Result<RoomId, RoomError> {
        Self::check_username(user_a)?;
        Self::check_username(user_b)?;

        if user_a == user_b {
            return Err(RoomError::InvalidInput(format!("cannot open a direct room with {user_a}")));
        }

        let (first, second) = if user_a < user_b { (user_a, user_b) } else { (user_b, user_a) };
        Ok(RoomId(format!("{}{first}{}{second}", Self::PREFIX, Self::DELIMITER)))
    }

    /// Recover the participant pair from a direct-room id.
    ///
    /// `None` if the id is not a well-formed direct-room id.
    #[must_use]
    pub fn parse(room: &RoomId) -> Option<(&str, &str)> {
        let rest = room.as_str().strip_prefix(Self::PREFIX)?;
        let (first, second) = rest.split_once(Self::DELIMITER)?;

        let well_formed = !first.is_empty()
            && !second.is_empty()
            && !second.contains(Self::DELIMITER)
            && first < second;
        well_formed.then_some((first, second))
    }

    /// The participant of a direct room who is not `me`.
    ///
    /// `None` if the id is malformed or `me` is not a participant.
    #[must_use]
    pub fn other_participant<'a>(room: &'a RoomId, me: &str) -> Option<&'a str> {
        match Self::parse(room)? {
            (first, second) if first == me => Some(second),
            (first, second) if second == me => Some(first),
            _ => None,
        }
    }

    fn check_username(username: &str) -> Result<(), RoomError> {
        if username.trim().is_empty() {
            return Err(RoomError::InvalidInput("username is empty".to_string()));
        }
        if username.contains(Self::DELIMITER) {
            return Err(RoomError::InvalidInput(format!(
                "username {username:?} contains {:?}",
                Self::DELIMITER
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn resolve_sorts_participants() {
        let room = DirectRoomResolver::resolve("bob", "alice").expect("valid pair");
        assert_eq!(room.as_str(), "dm:alice:bob");
        assert!(room.is_direct());
    }

    #[test]
    fn self_dm_rejected() {
        assert!(matches!(
            DirectRoomResolver::resolve("alice", "alice"),
            Err(RoomError::InvalidInput(_))
        ));
    }

    #[test]
    fn blank_and_delimited_usernames_rejected() {
        for (a, b) in [("", "bob"), ("alice", "  "), ("al:ice", "bob")] {
            assert!(matches!(DirectRoomResolver::resolve(a, b), Err(RoomError::InvalidInput(_))));
        }
    }

    #[test]
    fn parse_rejects_foreign_ids() {
        for id in ["general", "dm:", "dm:alice", "dm:bob:alice", "dm:a:b:c", "dm::bob"] {
            assert_eq!(DirectRoomResolver::parse(&RoomId::from_remote(id)), None, "{id}");
        }
    }

    #[test]
    fn other_participant_requires_membership() {
        let room = DirectRoomResolver::resolve("alice", "bob").expect("valid pair");
        assert_eq!(DirectRoomResolver::other_participant(&room, "alice"), Some("bob"));
        assert_eq!(DirectRoomResolver::other_participant(&room, "bob"), Some("alice"));
        assert_eq!(DirectRoomResolver::other_participant(&room, "carol"), None);
    }

    #[test]
    fn display_name_strips_namespace() {
        let direct = Room::classify(DirectRoomResolver::resolve("alice", "bob").expect("pair"));
        assert_eq!(direct.kind, RoomKind::Direct);
        assert_eq!(direct.display_name("alice"), "bob");

        let public = Room::classify(RoomId::public(" general ").expect("name"));
        assert_eq!(public.kind, RoomKind::Public);
        assert_eq!(public.display_name("alice"), "general");
    }

    #[test]
    fn public_names_cannot_enter_direct_namespace() {
        assert!(RoomId::public("dm:alice:bob").is_err());
        assert!(RoomId::public("   ").is_err());
    }

    proptest! {
        #[test]
        fn resolve_is_commutative(a in "[a-z0-9_]{1,16}", b in "[a-z0-9_]{1,16}") {
            prop_assume!(a != b);
            let ab = DirectRoomResolver::resolve(&a, &b).expect("valid pair");
            let ba = DirectRoomResolver::resolve(&b, &a).expect("valid pair");
            prop_assert_eq!(&ab, &ba);

            let parsed = DirectRoomResolver::parse(&ab);
            let (lo, hi) = if a < b { (a.as_str(), b.as_str()) } else { (b.as_str(), a.as_str()) };
            prop_assert_eq!(parsed, Some((lo, hi)));
        }

        #[test]
        fn derived_ids_never_pass_as_public(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assume!(a != b);
            let id = DirectRoomResolver::resolve(&a, &b).expect("valid pair");
            prop_assert!(RoomId::public(id.as_str()).is_err());
        }
    }
}
