//! Standard invariant checks.
//!
//! These capture what must hold after every step of any run, whatever the
//! script did.

use std::collections::HashSet;

use roomline_core::{Origin, SYSTEM_SENDER};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// The active room, if any, is in the room store.
pub struct ActiveRoomInStore;

impl Invariant for ActiveRoomInStore {
    fn name(&self) -> &'static str {
        "active_room_in_store"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        match &state.active_room {
            Some(active) if !state.rooms.contains(active) => Err(Violation {
                invariant: self.name(),
                message: format!("active room {active} not in rooms {:?}", state.rooms),
            }),
            _ => Ok(()),
        }
    }
}

/// The room store holds at most one entry per room id.
pub struct OneEntryPerRoom;

impl Invariant for OneEntryPerRoom {
    fn name(&self) -> &'static str {
        "one_entry_per_room"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for room in &state.rooms {
            if !seen.insert(room) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("room {room} listed twice"),
                });
            }
        }
        Ok(())
    }
}

/// Only the session's own messages go out; local notices never do.
pub struct NoForeignOutbound;

impl Invariant for NoForeignOutbound {
    fn name(&self) -> &'static str {
        "no_foreign_outbound"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for message in &state.outbound {
            if message.username == SYSTEM_SENDER || message.username != state.username {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "sent message from {:?} in {} (session is {:?})",
                        message.username, message.room, state.username
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No live entry repeats an earlier non-system entry of the same window.
///
/// Loading a snapshot replaces the log, so a log is always one window.
pub struct NoDuplicateDelivery;

impl Invariant for NoDuplicateDelivery {
    fn name(&self) -> &'static str {
        "no_duplicate_delivery"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (room, log) in &state.logs {
            let mut seen = HashSet::new();
            for message in log.iter().filter(|m| m.origin != Origin::System) {
                if !seen.insert(message.dedup_key()) && message.origin == Origin::Live {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "room {room}: duplicate {:?} from {}",
                            message.text, message.sender
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The session is joined to nothing but its active room.
pub struct JoinedOnlyActive;

impl Invariant for JoinedOnlyActive {
    fn name(&self) -> &'static str {
        "joined_only_active"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let stray: Vec<_> =
            state.joined.iter().filter(|room| Some(*room) != state.active_room.as_ref()).collect();
        if stray.is_empty() {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("joined {stray:?} while active room is {:?}", state.active_room),
            })
        }
    }
}
