//! Per-room message logs.
//!
//! Merges snapshot loads, live receipts and system notices into one ordered
//! log per room. Log order is application order: nothing is sorted, buffered
//! or reordered here, so the log mirrors the order events arrived.
//!
//! # Deduplication
//!
//! Each `load_snapshot` opens a new activation window for the room. Within a
//! window, a live message whose sender, text and timestamp match an entry
//! already appended in that window (snapshot or live) is dropped. This closes
//! the gap between a history fetch and the join that follows it, and absorbs
//! double echoes from the server. System notices never take part.
//!
//! User messages whose text is blank after trimming never enter a log, from
//! either a snapshot or the live channel.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use roomline_core::{Message, Origin, RoomId, Timestamp};
use tokio::sync::watch;
use tracing::{debug, trace};

type DedupKey = (String, String, Timestamp);

#[derive(Debug)]
struct RoomLog {
    entries: Vec<Message>,
    window: HashSet<DedupKey>,
    published: watch::Sender<Arc<[Message]>>,
}

impl RoomLog {
    fn new() -> Self {
        let (published, _) = watch::channel(Arc::from(Vec::<Message>::new()));
        Self { entries: Vec::new(), window: HashSet::new(), published }
    }

    fn publish(&self) {
        self.published.send_replace(Arc::from(self.entries.clone()));
    }
}

fn is_blank(message: &Message) -> bool {
    message.text.trim().is_empty()
}

fn key(message: &Message) -> DedupKey {
    let (sender, text, sent_at) = message.dedup_key();
    (sender.to_string(), text.to_string(), sent_at)
}

/// Ordered message logs, indexed by room.
///
/// Only the reconciler mutates logs; readers get slices or subscriptions.
#[derive(Debug, Default)]
pub struct MessageReconciler {
    logs: HashMap<RoomId, RoomLog>,
}

impl MessageReconciler {
    /// Create a reconciler with no logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the room's log with a freshly fetched snapshot.
    ///
    /// Opens a new activation window. Entries are marked
    /// [`Origin::Snapshot`] and attributed to `room`. Blank entries are
    /// skipped.
    pub fn load_snapshot(&mut self, room: &RoomId, messages: Vec<Message>) {
        let log = self.logs.entry(room.clone()).or_insert_with(RoomLog::new);

        log.entries = messages
            .into_iter()
            .filter(|message| {
                let blank = is_blank(message);
                if blank {
                    trace!(%room, sender = %message.sender, "blank snapshot entry dropped");
                }
                !blank
            })
            .map(|message| Message { room: room.clone(), ..message.with_origin(Origin::Snapshot) })
            .collect();
        log.window = log.entries.iter().map(key).collect();

        debug!(%room, entries = log.entries.len(), "snapshot loaded");
        log.publish();
    }

    /// Append a live message unless it is blank or duplicates one in the
    /// current window.
    ///
    /// Returns `true` if the message was appended.
    pub fn apply_live(&mut self, message: Message) -> bool {
        if is_blank(&message) {
            trace!(room = %message.room, sender = %message.sender, "blank live message dropped");
            return false;
        }

        let log = self.logs.entry(message.room.clone()).or_insert_with(RoomLog::new);

        if !log.window.insert(key(&message)) {
            trace!(room = %message.room, sender = %message.sender, "duplicate live message dropped");
            return false;
        }

        log.entries.push(message.with_origin(Origin::Live));
        log.publish();
        true
    }

    /// Append a locally synthesized notice stamped with `received_at`.
    pub fn apply_system_notice(&mut self, room: &RoomId, text: &str, received_at: Timestamp) {
        let log = self.logs.entry(room.clone()).or_insert_with(RoomLog::new);

        log.entries.push(Message::system(room.clone(), text, received_at));
        log.publish();
    }

    /// The room's log. Empty if nothing was ever applied to it.
    pub fn log(&self, room: &RoomId) -> &[Message] {
        self.logs.get(room).map(|log| log.entries.as_slice()).unwrap_or_default()
    }

    /// Subscribe to the room's log. The receiver sees every mutation.
    pub fn subscribe(&mut self, room: &RoomId) -> watch::Receiver<Arc<[Message]>> {
        let log = self.logs.entry(room.clone()).or_insert_with(RoomLog::new);
        log.published.subscribe()
    }

    /// Rooms that have a log.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.logs.keys()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn room(name: &str) -> RoomId {
        RoomId::public(name).unwrap()
    }

    fn msg(sender: &str, text: &str, room_name: &str, secs: i64) -> Message {
        Message {
            sender: sender.into(),
            text: text.into(),
            room: room(room_name),
            sent_at: at(secs),
            origin: Origin::Live,
        }
    }

    #[test]
    fn snapshot_then_identical_live_yields_one_entry() {
        let mut reconciler = MessageReconciler::new();
        reconciler.load_snapshot(&room("general"), vec![msg("a", "hi", "general", 1)]);

        assert!(!reconciler.apply_live(msg("a", "hi", "general", 1)));

        let log = reconciler.log(&room("general"));
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].origin, Origin::Snapshot);
    }

    #[test]
    fn new_snapshot_replaces_log_and_window() {
        let mut reconciler = MessageReconciler::new();
        let general = room("general");
        reconciler.load_snapshot(&general, vec![msg("a", "old", "general", 1)]);
        reconciler.apply_live(msg("b", "live", "general", 2));

        reconciler.load_snapshot(&general, vec![]);
        assert!(reconciler.log(&general).is_empty());

        // The earlier entries belong to a closed window.
        assert!(reconciler.apply_live(msg("a", "old", "general", 1)));
        assert_eq!(reconciler.log(&general).len(), 1);
    }

    #[test]
    fn same_text_different_time_is_not_duplicate() {
        let mut reconciler = MessageReconciler::new();
        reconciler.load_snapshot(&room("general"), vec![msg("a", "hi", "general", 1)]);

        assert!(reconciler.apply_live(msg("a", "hi", "general", 2)));
        assert_eq!(reconciler.log(&room("general")).len(), 2);
    }

    #[test]
    fn double_echo_is_absorbed() {
        let mut reconciler = MessageReconciler::new();
        reconciler.load_snapshot(&room("general"), vec![]);

        assert!(reconciler.apply_live(msg("alice", "hi", "general", 3)));
        assert!(!reconciler.apply_live(msg("alice", "hi", "general", 3)));
        assert_eq!(reconciler.log(&room("general")).len(), 1);
    }

    #[test]
    fn blank_user_messages_never_enter_the_log() {
        let mut reconciler = MessageReconciler::new();
        let general = room("general");
        reconciler.load_snapshot(
            &general,
            vec![
                msg("bob", "", "general", 1),
                msg("bob", "hey", "general", 2),
                msg("carol", " \t", "general", 3),
            ],
        );
        assert_eq!(reconciler.log(&general).len(), 1);
        assert_eq!(reconciler.log(&general)[0].text, "hey");

        assert!(!reconciler.apply_live(msg("bob", "   ", "general", 4)));
        assert_eq!(reconciler.log(&general).len(), 1);

        assert!(reconciler.apply_live(msg("bob", "ok", "general", 4)));
        assert_eq!(reconciler.log(&general).len(), 2);
    }

    #[test]
    fn system_notices_are_never_deduplicated() {
        let mut reconciler = MessageReconciler::new();
        let general = room("general");
        reconciler.apply_system_notice(&general, "reconnected", at(5));
        reconciler.apply_system_notice(&general, "reconnected", at(5));

        let log = reconciler.log(&general);
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|m| m.origin == Origin::System && m.sender == "system"));
    }

    #[test]
    fn rooms_are_isolated() {
        let mut reconciler = MessageReconciler::new();
        reconciler.load_snapshot(&room("x"), vec![msg("a", "hi", "x", 1)]);
        reconciler.apply_live(msg("a", "hi", "y", 1));

        assert_eq!(reconciler.log(&room("x")).len(), 1);
        assert_eq!(reconciler.log(&room("y")).len(), 1);
        assert!(reconciler.log(&room("z")).is_empty());
        assert_eq!(reconciler.rooms().count(), 2);
    }

    #[test]
    fn subscription_tracks_mutations() {
        let mut reconciler = MessageReconciler::new();
        let general = room("general");
        let mut rx = reconciler.subscribe(&general);
        rx.borrow_and_update();

        reconciler.apply_live(msg("bob", "hello", "general", 1));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        reconciler.apply_live(msg("bob", "hello", "general", 1));
        assert!(!rx.has_changed().unwrap());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Snapshot(Vec<(u8, u8)>),
        Live(u8, u8),
        Notice(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec((0u8..3, 0u8..4), 0..4).prop_map(Op::Snapshot),
            (0u8..3, 0u8..4).prop_map(|(s, t)| Op::Live(s, t)),
            (0u8..4).prop_map(Op::Notice),
        ]
    }

    fn entry(sender: u8, text: u8) -> Message {
        msg(&format!("user{sender}"), &format!("text{text}"), "general", i64::from(text))
    }

    proptest! {
        /// The log equals a model that applies operations in call order with
        /// the window rule, and never holds two non-system entries with the
        /// same key in one window.
        #[test]
        fn log_follows_call_order(ops in prop::collection::vec(op(), 0..48)) {
            let general = room("general");
            let mut reconciler = MessageReconciler::new();
            let mut model: Vec<Message> = Vec::new();
            let mut window: HashSet<DedupKey> = HashSet::new();

            for op in ops {
                match op {
                    Op::Snapshot(entries) => {
                        let messages: Vec<_> = entries.iter().map(|&(s, t)| entry(s, t)).collect();
                        model = messages
                            .iter()
                            .map(|m| m.clone().with_origin(Origin::Snapshot))
                            .collect();
                        window = model.iter().map(key).collect();
                        reconciler.load_snapshot(&general, messages);
                    },
                    Op::Live(s, t) => {
                        let message = entry(s, t);
                        if window.insert(key(&message)) {
                            model.push(message.clone());
                        }
                        reconciler.apply_live(message);
                    },
                    Op::Notice(n) => {
                        let text = format!("notice{n}");
                        model.push(Message::system(general.clone(), text.clone(), at(0)));
                        reconciler.apply_system_notice(&general, &text, at(0));
                    },
                }
                prop_assert_eq!(reconciler.log(&general), model.as_slice());
            }
        }
    }
}
