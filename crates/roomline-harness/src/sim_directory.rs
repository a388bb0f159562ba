//! In-memory directory with controllable latency.
//!
//! History fetches for a held room park until the room is released, which
//! lets scripts reorder snapshot completions against later activations.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use roomline_app::{Directory, DirectoryError};
use roomline_core::{Environment, Message, Origin, Room, RoomId};

use crate::SimEnv;

#[derive(Debug, Default)]
struct DirectoryState {
    rooms: Vec<RoomId>,
    users: Vec<String>,
    history: HashMap<RoomId, Vec<Message>>,
    held: HashSet<RoomId>,
    latency: Duration,
    unavailable: bool,
    history_requests: Vec<RoomId>,
}

/// Directory backed by shared in-memory state. Clones share state.
#[derive(Debug, Clone)]
pub struct SimDirectory {
    env: SimEnv,
    state: Arc<Mutex<DirectoryState>>,
}

impl SimDirectory {
    /// Empty directory on `env`'s clock.
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(DirectoryState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register rooms in listing order.
    #[must_use]
    pub fn with_rooms(self, names: &[&str]) -> Self {
        self.state().rooms.extend(names.iter().map(|name| RoomId::from_remote(*name)));
        self
    }

    /// Register users.
    #[must_use]
    pub fn with_users(self, users: &[&str]) -> Self {
        self.state().users.extend(users.iter().map(ToString::to_string));
        self
    }

    /// Store `(sender, text, seconds after epoch)` entries as the room's
    /// history.
    #[must_use]
    pub fn with_history(self, room: &str, entries: &[(&str, &str, i64)]) -> Self {
        let id = RoomId::from_remote(room);
        let epoch = self.env.epoch();
        let messages = entries
            .iter()
            .map(|&(sender, text, secs)| Message {
                sender: sender.to_string(),
                text: text.to_string(),
                room: id.clone(),
                sent_at: epoch + chrono::Duration::seconds(secs),
                origin: Origin::Snapshot,
            })
            .collect();
        self.state().history.insert(id, messages);
        self
    }

    /// Delay every request by `latency` of virtual time.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Fail every request with a transport error while `unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Park history fetches for `room` until [`Self::release`].
    pub fn hold(&self, room: &RoomId) {
        self.state().held.insert(room.clone());
    }

    /// Let parked history fetches for `room` complete.
    pub fn release(&self, room: &RoomId) {
        self.state().held.remove(room);
    }

    /// Rooms currently listed.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.state().rooms.clone()
    }

    /// Every history fetch issued, in order.
    pub fn history_requests(&self) -> Vec<RoomId> {
        self.state().history_requests.clone()
    }

    async fn respond(&self) -> Result<(), DirectoryError> {
        let latency = self.state().latency;
        let ready_at = self.env.now().after(latency);
        while self.env.now() < ready_at {
            tokio::task::yield_now().await;
        }
        if self.state().unavailable {
            return Err(DirectoryError::Transport("directory unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for SimDirectory {
    async fn list_rooms(&self) -> Result<Vec<RoomId>, DirectoryError> {
        self.respond().await?;
        Ok(self.rooms())
    }

    async fn list_users(&self) -> Result<Vec<String>, DirectoryError> {
        self.respond().await?;
        Ok(self.state().users.clone())
    }

    async fn create_room(&self, name: &RoomId) -> Result<Room, DirectoryError> {
        self.respond().await?;
        let mut state = self.state();
        if state.rooms.contains(name) {
            return Err(DirectoryError::Duplicate(name.to_string()));
        }
        state.rooms.push(name.clone());
        Ok(Room::classify(name.clone()))
    }

    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<Message>, DirectoryError> {
        self.state().history_requests.push(room.clone());
        while self.state().held.contains(room) {
            tokio::task::yield_now().await;
        }
        self.respond().await?;
        Ok(self.state().history.get(room).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let directory = SimDirectory::new(SimEnv::with_seed(0)).with_rooms(&["general"]);
        let general = RoomId::from_remote("general");

        assert_eq!(
            directory.create_room(&general).await,
            Err(DirectoryError::Duplicate("general".into()))
        );

        let lobby = RoomId::from_remote("lobby");
        assert_eq!(directory.create_room(&lobby).await.unwrap().id, lobby);
        assert_eq!(directory.rooms(), [general, lobby]);
    }

    #[tokio::test]
    async fn history_is_stamped_from_epoch() {
        let env = SimEnv::with_seed(0);
        let directory = SimDirectory::new(env.clone()).with_history("general", &[("bob", "hi", 5)]);

        let history = directory.fetch_history(&RoomId::from_remote("general")).await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sent_at, env.epoch() + chrono::Duration::seconds(5));
        assert!(directory.fetch_history(&RoomId::from_remote("empty")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_directory_fails() {
        let directory = SimDirectory::new(SimEnv::with_seed(0));
        directory.set_unavailable(true);
        assert!(directory.list_rooms().await.unwrap_err().is_transient());
    }
}
