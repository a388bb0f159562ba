//! Registry of rooms known to the session.
//!
//! Holds identifiers only, never message content. Insertion order is kept so
//! room lists stay stable for presentation.

use std::{collections::HashSet, sync::Arc};

use roomline_core::{Room, RoomError, RoomId, RoomKind};
use tokio::sync::watch;
use tracing::debug;

/// Rooms known to the session, plus the active one.
///
/// # Invariants
///
/// - At most one entry per room id.
/// - The active room, if any, is present in the store.
#[derive(Debug)]
pub struct RoomStore {
    rooms: Vec<Room>,
    ids: HashSet<RoomId>,
    active: Option<RoomId>,
    published: watch::Sender<Arc<[Room]>>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (published, _) = watch::channel(Arc::from(Vec::<Room>::new()));
        Self { rooms: Vec::new(), ids: HashSet::new(), active: None, published }
    }

    /// Rooms in first-seen order.
    pub fn list_rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Look up a room by id.
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| &room.id == id)
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: &RoomId) -> bool {
        self.ids.contains(id)
    }

    /// Currently active room.
    pub fn active(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    /// Validate `name` as a public room not yet in the store.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if the name is blank or reserved
    /// - `RoomError::DuplicateRoom` if a room with that name exists
    pub fn check_new(&self, name: &str) -> Result<RoomId, RoomError> {
        let id = RoomId::public(name)?;
        if self.contains(&id) {
            return Err(RoomError::DuplicateRoom(id.to_string()));
        }
        Ok(id)
    }

    /// Register a new public room.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if the name is blank or reserved
    /// - `RoomError::DuplicateRoom` if a room with that name exists
    pub fn add_room(&mut self, name: &str) -> Result<Room, RoomError> {
        let id = self.check_new(name)?;
        let room = Room { id, kind: RoomKind::Public };
        self.insert(room.clone());
        Ok(room)
    }

    /// Register a derived direct room. Adding the same id again is a no-op.
    ///
    /// # Errors
    ///
    /// - `RoomError::InvalidInput` if `id` is not in the direct namespace
    pub fn add_direct(&mut self, id: RoomId) -> Result<Room, RoomError> {
        if !id.is_direct() {
            return Err(RoomError::InvalidInput(format!("{id} is not a direct room")));
        }
        if let Some(existing) = self.get(&id) {
            return Ok(existing.clone());
        }

        let room = Room { id, kind: RoomKind::Direct };
        self.insert(room.clone());
        Ok(room)
    }

    /// Merge room ids reported by the directory.
    ///
    /// Already-known ids are skipped; new ones keep the directory's order.
    /// Returns how many rooms were added.
    pub fn seed_public<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = RoomId>,
    {
        let before = self.rooms.len();
        for id in ids {
            if self.ids.contains(&id) {
                continue;
            }
            self.rooms.push(Room::classify(id.clone()));
            self.ids.insert(id);
        }

        let added = self.rooms.len() - before;
        if added > 0 {
            debug!(added, "rooms seeded from directory");
            self.publish();
        }
        added
    }

    /// Make `id` the active room.
    ///
    /// # Errors
    ///
    /// - `RoomError::UnknownRoom` if `id` is not registered
    pub fn set_active(&mut self, id: &RoomId) -> Result<(), RoomError> {
        if !self.contains(id) {
            return Err(RoomError::UnknownRoom(id.to_string()));
        }
        self.active = Some(id.clone());
        Ok(())
    }

    /// Subscribe to the ordered room list. The receiver sees every change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<[Room]>> {
        self.published.subscribe()
    }

    fn insert(&mut self, room: Room) {
        debug!(room = %room.id, kind = ?room.kind, "room added");
        self.ids.insert(room.id.clone());
        self.rooms.push(room);
        self.publish();
    }

    fn publish(&self) {
        self.published.send_replace(Arc::from(self.rooms.clone()));
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use roomline_core::DirectRoomResolver;

    use super::*;

    fn id(name: &str) -> RoomId {
        RoomId::public(name).unwrap()
    }

    #[test]
    fn preserves_insertion_order() {
        let mut store = RoomStore::new();
        store.add_room("zeta").unwrap();
        store.add_room("alpha").unwrap();
        store.seed_public([id("general"), id("alpha"), id("random")]);

        let names: Vec<_> = store.list_rooms().iter().map(|room| room.id.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "general", "random"]);
    }

    #[test]
    fn duplicate_public_room_rejected() {
        let mut store = RoomStore::new();
        store.add_room("general").unwrap();

        assert_eq!(store.add_room(" general "), Err(RoomError::DuplicateRoom("general".into())));
        assert_eq!(store.check_new("general"), Err(RoomError::DuplicateRoom("general".into())));
        assert_eq!(store.list_rooms().len(), 1);

        assert_eq!(store.check_new("lobby"), Ok(id("lobby")));
        assert!(!store.contains(&id("lobby")));
    }

    #[test]
    fn repeated_direct_room_is_idempotent() {
        let mut store = RoomStore::new();
        let dm = DirectRoomResolver::resolve("alice", "bob").unwrap();

        let first = store.add_direct(dm.clone()).unwrap();
        let second = store.add_direct(DirectRoomResolver::resolve("bob", "alice").unwrap()).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.list_rooms().len(), 1);
        assert_eq!(store.list_rooms()[0].kind, RoomKind::Direct);
    }

    #[test]
    fn set_active_requires_known_room() {
        let mut store = RoomStore::new();
        assert_eq!(store.set_active(&id("nowhere")), Err(RoomError::UnknownRoom("nowhere".into())));
        assert_eq!(store.active(), None);

        store.add_room("general").unwrap();
        store.set_active(&id("general")).unwrap();
        assert_eq!(store.active(), Some(&id("general")));
    }

    #[test]
    fn subscribers_see_changes() {
        let mut store = RoomStore::new();
        let mut rx = store.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        store.add_room("general").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        // Seeding only known rooms publishes nothing.
        store.seed_public([id("general")]);
        assert!(!rx.has_changed().unwrap());
    }

    proptest! {
        #[test]
        fn one_entry_per_id(names in prop::collection::vec("[a-c]{1,2}", 0..32)) {
            let mut store = RoomStore::new();
            for name in &names {
                let _ = store.add_room(name);
                store.seed_public([id(name)]);
            }

            let unique: HashSet<_> = store.list_rooms().iter().map(|room| &room.id).collect();
            prop_assert_eq!(unique.len(), store.list_rooms().len());
        }
    }
}
