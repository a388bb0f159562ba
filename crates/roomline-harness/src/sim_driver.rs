//! Scripted driver for simulation.
//!
//! Replays a fixed script of user intents and world events against a
//! [`SimRemote`] and [`SimDirectory`], checking invariants on every render.
//! When the script runs out the driver asks the runtime to quit.

use std::{collections::VecDeque, time::Duration};

use roomline_app::{ChatSession, Driver, DriverInput, SessionNotice, TransportEvent, UserIntent};
use roomline_core::{Credential, Environment, RoomId};
use roomline_proto::Frame;
use tracing::trace;

use crate::{InvariantRegistry, SimDirectory, SimEnv, SimInstant, SimRemote, SystemSnapshot};

/// Simulated driver error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// One step of a simulation script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Hand a user intent to the runtime
    Intent(UserIntent),
    /// Let virtual time pass while the runtime keeps running
    Wait(Duration),
    /// Another user posts to a room
    Deliver {
        /// Author
        sender: String,
        /// Text
        text: String,
        /// Room name
        room: String,
    },
    /// The server posts a notice to a room
    Notice {
        /// Room name
        room: String,
        /// Text
        text: String,
    },
    /// The server drops the connection
    DropConnection(String),
    /// Refuse the next N transport opens
    FailOpens(u32),
    /// Park history fetches for a room
    Hold(RoomId),
    /// Let parked history fetches for a room complete
    Release(RoomId),
}

impl ScriptStep {
    /// Shorthand for [`ScriptStep::Deliver`].
    pub fn deliver(sender: &str, text: &str, room: &str) -> Self {
        Self::Deliver { sender: sender.into(), text: text.into(), room: room.into() }
    }

    /// Shorthand for a [`ScriptStep::Wait`] of `millis`.
    pub fn wait_ms(millis: u64) -> Self {
        Self::Wait(Duration::from_millis(millis))
    }
}

/// Driver that plays a script against simulated collaborators.
#[derive(Debug)]
pub struct SimDriver {
    env: SimEnv,
    remote: SimRemote,
    directory: SimDirectory,
    script: VecDeque<ScriptStep>,
    wait_until: Option<SimInstant>,
    open: bool,
    invariants: Option<InvariantRegistry>,
    last_snapshot: Option<SystemSnapshot>,
    before_quit: Option<SystemSnapshot>,
    finished: bool,
    notices: Vec<SessionNotice>,
    renders: usize,
    closes: Vec<String>,
    stopped: bool,
}

impl SimDriver {
    /// Driver playing `script`.
    pub fn new(
        env: SimEnv,
        remote: SimRemote,
        directory: SimDirectory,
        script: impl IntoIterator<Item = ScriptStep>,
    ) -> Self {
        Self {
            env,
            remote,
            directory,
            script: script.into_iter().collect(),
            wait_until: None,
            open: false,
            invariants: None,
            last_snapshot: None,
            before_quit: None,
            finished: false,
            notices: Vec::new(),
            renders: 0,
            closes: Vec::new(),
            stopped: false,
        }
    }

    /// Check `registry` on every render. A violation ends the run with an
    /// error.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Simulated server.
    pub fn remote(&self) -> &SimRemote {
        &self.remote
    }

    /// Simulated directory.
    pub fn directory(&self) -> &SimDirectory {
        &self.directory
    }

    /// Notices the runtime reported, in order.
    pub fn notices(&self) -> &[SessionNotice] {
        &self.notices
    }

    /// Snapshot taken at the latest render.
    pub fn last_snapshot(&self) -> Option<&SystemSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Snapshot taken at the last render before the script ran out, that
    /// is, before the runtime started shutting down.
    pub fn snapshot_before_quit(&self) -> Option<&SystemSnapshot> {
        self.before_quit.as_ref()
    }

    /// Number of renders so far.
    pub fn renders(&self) -> usize {
        self.renders
    }

    /// Reasons given for each transport close.
    pub fn closes(&self) -> &[String] {
        &self.closes
    }

    /// True once the runtime released the driver.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Apply a world event. Returns the input for an intent step.
    fn apply(&mut self, step: ScriptStep) -> Option<DriverInput> {
        trace!(?step, at = self.env.now().as_millis(), "script step");
        match step {
            ScriptStep::Intent(intent) => return Some(DriverInput::Intent(intent)),
            ScriptStep::Wait(duration) => self.wait_until = Some(self.env.now().after(duration)),
            ScriptStep::Deliver { sender, text, room } => {
                self.remote.deliver(&sender, &text, &room, self.env.wall_clock());
            },
            ScriptStep::Notice { room, text } => self.remote.notice(&room, &text),
            ScriptStep::DropConnection(reason) => self.remote.drop_connection(&reason),
            ScriptStep::FailOpens(count) => self.remote.fail_next_opens(count),
            ScriptStep::Hold(room) => self.directory.hold(&room),
            ScriptStep::Release(room) => self.directory.release(&room),
        }
        None
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn next_input(&mut self) -> Result<DriverInput, SimDriverError> {
        loop {
            if self.open
                && let Some(event) = self.remote.next_event()
            {
                if matches!(event, TransportEvent::Closed { .. }) {
                    self.open = false;
                }
                return Ok(DriverInput::Transport(event));
            }

            if let Some(until) = self.wait_until {
                if self.env.now() < until {
                    tokio::task::yield_now().await;
                    continue;
                }
                self.wait_until = None;
            }

            let Some(step) = self.script.pop_front() else {
                self.finished = true;
                return Ok(DriverInput::Intent(UserIntent::Quit));
            };
            if let Some(input) = self.apply(step) {
                return Ok(input);
            }
        }
    }

    async fn open(&mut self, _credential: &Credential) -> Result<(), SimDriverError> {
        self.remote.open().map_err(SimDriverError)?;
        self.open = true;
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), SimDriverError> {
        if !self.open {
            return Err(SimDriverError("transport not open".to_string()));
        }
        self.remote.receive(&frame);
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        self.closes.push(reason.to_string());
        self.remote.close();
        self.open = false;
    }

    fn render<E: Environment>(&mut self, session: &ChatSession<E>) -> Result<(), SimDriverError> {
        self.renders += 1;
        let snapshot = SystemSnapshot::capture(session, self.remote.sent_messages());

        if let Some(registry) = &self.invariants
            && let Err(violations) = registry.check_all(&snapshot)
        {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            return Err(SimDriverError(format!(
                "invariant violation at render {} (t={}ms):\n  {}",
                self.renders,
                self.env.now().as_millis(),
                messages.join("\n  ")
            )));
        }

        if !self.finished {
            self.before_quit = Some(snapshot.clone());
        }
        self.last_snapshot = Some(snapshot);
        Ok(())
    }

    fn notify(&mut self, notice: &SessionNotice) {
        self.notices.push(notice.clone());
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
