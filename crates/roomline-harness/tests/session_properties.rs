//! Property-based runs of the full runtime.
//!
//! Random scripts of user intents and world events (deliveries, drops,
//! refused opens, delayed history) are replayed against the simulated
//! server. The standard invariants are checked on every render.

use std::sync::Arc;

use proptest::prelude::*;
use roomline_app::{ChatSession, Runtime, RuntimeConfig, SessionNotice, UserIntent};
use roomline_core::{ConnectionConfig, ConnectionState, Credential, RoomId, SessionContext};
use roomline_harness::{InvariantRegistry, ScriptStep, SimDirectory, SimDriver, SimEnv, SimRemote};

const ROOMS: [&str; 3] = ["general", "random", "dm:alice:bob"];

fn room_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ROOMS.to_vec())
}

fn step() -> impl Strategy<Value = ScriptStep> {
    prop_oneof![
        3 => room_name()
            .prop_map(|name| ScriptStep::Intent(UserIntent::Activate(RoomId::from_remote(name)))),
        3 => "[ab ]{0,3}".prop_map(|text| ScriptStep::Intent(UserIntent::Send(text))),
        1 => prop::sample::select(vec!["general", "lobby", " ", "dm:x"])
            .prop_map(|name| ScriptStep::Intent(UserIntent::CreateRoom(name.into()))),
        1 => prop::sample::select(vec!["bob", "carol", "alice", ""])
            .prop_map(|user| ScriptStep::Intent(UserIntent::StartDirect(user.into()))),
        1 => Just(ScriptStep::Intent(UserIntent::Refresh)),
        1 => Just(ScriptStep::Intent(UserIntent::Reconnect)),
        3 => (prop::sample::select(vec!["bob", "alice"]), "[ab]{1,2}", room_name())
            .prop_map(|(sender, text, room)| ScriptStep::deliver(sender, &text, room)),
        1 => room_name().prop_map(|room| ScriptStep::Notice {
            room: room.into(),
            text: "notice".into(),
        }),
        1 => Just(ScriptStep::DropConnection("reset".into())),
        1 => (0u32..3).prop_map(ScriptStep::FailOpens),
        1 => room_name().prop_map(|name| ScriptStep::Hold(RoomId::from_remote(name))),
        1 => room_name().prop_map(|name| ScriptStep::Release(RoomId::from_remote(name))),
        4 => (0u64..3000).prop_map(ScriptStep::wait_ms),
    ]
}

/// Release every held room and give reconnects time to finish.
fn settle_tail() -> Vec<ScriptStep> {
    let mut tail: Vec<_> =
        ROOMS.iter().map(|name| ScriptStep::Release(RoomId::from_remote(*name))).collect();
    tail.push(ScriptStep::wait_ms(60_000));
    tail
}

fn play(seed: u64, mut script: Vec<ScriptStep>) -> Runtime<SimDriver, SimEnv, SimDirectory> {
    script.extend(settle_tail());

    let env = SimEnv::with_seed(seed);
    let remote = SimRemote::new().accept_token("tok");
    let directory = SimDirectory::new(env.clone())
        .with_rooms(&["general", "random"])
        .with_users(&["alice", "bob", "carol"])
        .with_history("general", &[("bob", "a", 0), ("bob", "b", 1)]);

    let context = SessionContext::new("alice", Credential::new("tok"));
    let session = ChatSession::new(env.clone(), context, ConnectionConfig::default());
    let driver = SimDriver::new(env, remote, directory.clone(), script)
        .with_invariants(InvariantRegistry::standard());
    let mut runtime = Runtime::new(driver, session, Arc::new(directory), RuntimeConfig::default());

    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    if let Err(err) = rt.block_on(runtime.run()) {
        panic!("run failed: {err}");
    }
    runtime
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariants hold after every step, and once things settle the session
    /// is joined to exactly its active room.
    #[test]
    fn invariants_hold_under_random_scripts(
        seed in any::<u64>(),
        script in prop::collection::vec(step(), 0..40),
    ) {
        let runtime = play(seed, script);
        let settled = runtime.driver().snapshot_before_quit().unwrap();

        if settled.state == ConnectionState::Connected {
            let expected: Vec<RoomId> = settled.active_room.iter().cloned().collect();
            prop_assert_eq!(&settled.joined, &expected);
        }
        for message in runtime.driver().remote().sent_messages() {
            prop_assert_eq!(message.username.as_str(), "alice");
            prop_assert!(!message.text.trim().is_empty());
        }
    }

    /// Replaying the same seed and script reproduces the run exactly.
    #[test]
    fn runs_are_reproducible(
        seed in any::<u64>(),
        script in prop::collection::vec(step(), 0..20),
    ) {
        let first = play(seed, script.clone());
        let second = play(seed, script);

        let notices = |r: &Runtime<SimDriver, SimEnv, SimDirectory>| -> Vec<SessionNotice> {
            r.driver().notices().to_vec()
        };
        prop_assert_eq!(notices(&first), notices(&second));
        prop_assert_eq!(first.driver().renders(), second.driver().renders());
        prop_assert_eq!(
            first.driver().remote().join_log(),
            second.driver().remote().join_log()
        );
    }
}
