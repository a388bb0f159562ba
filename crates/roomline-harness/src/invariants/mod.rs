//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during a run. Unlike
//! example-based tests that check specific scenarios, they are evaluated
//! after every step of arbitrary scripts.
//!
//! # Architecture
//!
//! The simulated driver captures a [`SystemSnapshot`] from the session and
//! the remote on every render, then runs the registered [`Invariant`] checks
//! against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SystemSnapshot::capture(&session, remote.sent_messages());
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ActiveRoomInStore, JoinedOnlyActive, NoDuplicateDelivery, NoForeignOutbound, OneEntryPerRoom,
};
pub use snapshot::SystemSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against system state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl std::fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.invariants.iter().map(|inv| inv.name()).collect();
        f.debug_struct("InvariantRegistry").field("invariants", &names).finish()
    }
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every standard invariant:
    ///
    /// - [`ActiveRoomInStore`]
    /// - [`OneEntryPerRoom`]
    /// - [`NoForeignOutbound`]
    /// - [`NoDuplicateDelivery`]
    /// - [`JoinedOnlyActive`]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(ActiveRoomInStore);
        registry.add(OneEntryPerRoom);
        registry.add(NoForeignOutbound);
        registry.add(NoDuplicateDelivery);
        registry.add(JoinedOnlyActive);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use roomline_core::{Message, Origin, RoomId};
    use roomline_proto::payloads::chat::ChatMessage;

    use super::*;

    fn room(name: &str) -> RoomId {
        RoomId::from_remote(name)
    }

    fn live(sender: &str, text: &str, room_name: &str) -> Message {
        Message {
            sender: sender.into(),
            text: text.into(),
            room: room(room_name),
            sent_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            origin: Origin::Live,
        }
    }

    fn healthy() -> SystemSnapshot {
        let mut state = SystemSnapshot::new("alice");
        state.rooms = vec![room("general"), room("random")];
        state.active_room = Some(room("general"));
        state.joined = vec![room("general")];
        state.logs.insert(room("general"), vec![live("bob", "hi", "general")]);
        state
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
        assert!(!registry.is_empty());
        assert!(InvariantRegistry::new().is_empty());
    }

    #[test]
    fn healthy_state_passes() {
        assert_eq!(InvariantRegistry::standard().check_all(&healthy()), Ok(()));
    }

    #[test]
    fn active_room_must_be_stored() {
        let mut state = healthy();
        state.active_room = Some(room("ghost"));
        state.joined.clear();
        assert_eq!(ActiveRoomInStore.check(&state).unwrap_err().invariant, "active_room_in_store");
    }

    #[test]
    fn duplicate_rooms_detected() {
        let mut state = healthy();
        state.rooms.push(room("general"));
        assert!(OneEntryPerRoom.check(&state).is_err());
    }

    #[test]
    fn outbound_must_come_from_session_user() {
        let mut state = healthy();
        state.outbound.push(ChatMessage {
            username: "system".into(),
            text: "reconnected".into(),
            room: "general".into(),
            sent_at: DateTime::from_timestamp(0, 0).unwrap(),
        });
        assert!(NoForeignOutbound.check(&state).is_err());
    }

    #[test]
    fn duplicate_live_entry_detected_but_notices_ignored() {
        let mut state = healthy();
        let notice = Message::system(room("general"), "reconnected", live("", "", "general").sent_at);
        state.logs.get_mut(&room("general")).unwrap().extend([notice.clone(), notice]);
        assert!(NoDuplicateDelivery.check(&state).is_ok());

        state.logs.get_mut(&room("general")).unwrap().push(live("bob", "hi", "general"));
        assert!(NoDuplicateDelivery.check(&state).is_err());
    }

    #[test]
    fn stray_join_detected() {
        let mut state = healthy();
        state.joined.push(room("random"));

        let violations = InvariantRegistry::standard().check_all(&state).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "joined_only_active");
    }
}
