//! Generic runtime for session orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`ChatSession`]: Pure session state machine
//! - [`Directory`]: Request/response collaborator
//! - [`Driver`]: Platform-specific I/O
//!
//! One task runs the loop. Directory requests are in flight concurrently, but
//! their results re-enter the session one at a time through the same loop as
//! user intents, transport events and ticks. Sources are polled in a fixed
//! order (driver input, directory results, tick) so simulated runs replay
//! identically.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture, stream::FuturesUnordered};
use roomline_core::{ConnectionAction, Environment};
use tracing::{debug, info, warn};

use crate::{
    ChatSession, Directory, Driver, DriverInput, RuntimeError, SessionAction, SessionEvent,
    SessionNotice, TransportEvent, UserIntent,
};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Interval between session ticks (timeouts, heartbeats, backoff)
    pub tick_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_interval: Duration::from_millis(250) }
    }
}

/// What woke the loop.
enum Step {
    Input(DriverInput),
    Event(SessionEvent),
}

/// Generic runtime that orchestrates a session, a directory and a driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
/// - `R`: Directory service
pub struct Runtime<D, E, R>
where
    D: Driver,
    E: Environment,
    R: Directory + 'static,
{
    driver: D,
    session: ChatSession<E>,
    directory: Arc<R>,
    config: RuntimeConfig,
    pending: FuturesUnordered<BoxFuture<'static, SessionEvent>>,
}

impl<D, E, R> Runtime<D, E, R>
where
    D: Driver,
    E: Environment,
    R: Directory + 'static,
{
    /// Create a runtime around an existing session.
    pub fn new(driver: D, session: ChatSession<E>, directory: Arc<R>, config: RuntimeConfig) -> Self {
        Self { driver, session, directory, config, pending: FuturesUnordered::new() }
    }

    /// Session driven by this runtime.
    pub fn session(&self) -> &ChatSession<E> {
        &self.session
    }

    /// Driver used by this runtime.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run until the user quits.
    ///
    /// Connects and lists the directory on start; disconnects on quit.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Session` if the session cannot start connecting
    ///   (for example, no credential)
    /// - `RuntimeError::Driver` if the driver fails to read input or render
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.driver.render(&self.session).map_err(RuntimeError::Driver)?;

        let actions = self.session.connect()?;
        self.execute(actions).await?;
        let actions = self.session.refresh_directory();
        self.execute(actions).await?;

        let env = self.session.env().clone();
        let mut tick = Box::pin(env.sleep(self.config.tick_interval));

        loop {
            let step = tokio::select! {
                biased;

                input = self.driver.next_input() => Step::Input(input.map_err(RuntimeError::Driver)?),
                Some(event) = self.pending.next(), if !self.pending.is_empty() => Step::Event(event),
                () = &mut tick => {
                    tick = Box::pin(env.sleep(self.config.tick_interval));
                    Step::Event(SessionEvent::Tick)
                },
            };

            let actions = match step {
                Step::Input(DriverInput::Intent(UserIntent::Quit)) => break,
                Step::Input(DriverInput::Intent(intent)) => self.on_intent(intent),
                Step::Input(DriverInput::Transport(TransportEvent::Frame(frame))) => {
                    self.session.handle(SessionEvent::Frame(frame))
                },
                Step::Input(DriverInput::Transport(TransportEvent::Closed { reason })) => {
                    self.session.handle(SessionEvent::TransportClosed { reason })
                },
                Step::Event(event) => self.session.handle(event),
            };
            self.execute(actions).await?;
        }

        info!(username = self.session.username(), "quitting");
        let actions = self.session.disconnect();
        self.execute(actions).await?;
        self.driver.stop();
        Ok(())
    }

    fn on_intent(&mut self, intent: UserIntent) -> Vec<SessionAction> {
        debug!(?intent, "user intent");
        let result = match intent {
            UserIntent::Activate(room) => self.session.activate_room(&room),
            UserIntent::Send(text) => self.session.compose_and_send(&text),
            UserIntent::CreateRoom(name) => self.session.create_room(&name),
            UserIntent::StartDirect(user) => self.session.start_direct(&user),
            UserIntent::Refresh => Ok(self.session.refresh_directory()),
            UserIntent::Reconnect => self.session.connect(),
            UserIntent::Quit => Ok(Vec::new()),
        };
        result.unwrap_or_else(|err| vec![SessionAction::Notify(SessionNotice::Error(err))])
    }

    /// Execute actions, feeding synchronous transport outcomes straight back
    /// into the session. Renders once the queue is empty.
    async fn execute(&mut self, actions: Vec<SessionAction>) -> Result<(), RuntimeError<D::Error>> {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Transport(ConnectionAction::Open { credential }) => {
                    let event = match self.driver.open(&credential).await {
                        Ok(()) => SessionEvent::TransportOpened,
                        Err(err) => {
                            warn!(error = %err, "transport open failed");
                            SessionEvent::TransportClosed { reason: err.to_string() }
                        },
                    };
                    queue.extend(self.session.handle(event));
                },
                SessionAction::Transport(ConnectionAction::SendFrame(frame)) => {
                    if let Err(err) = self.driver.send_frame(frame).await {
                        warn!(error = %err, "send failed");
                        let event = SessionEvent::TransportClosed { reason: err.to_string() };
                        queue.extend(self.session.handle(event));
                    }
                },
                SessionAction::Transport(ConnectionAction::Close { reason }) => {
                    self.driver.close(&reason);
                },
                SessionAction::Transport(ConnectionAction::ReportError(err)) => {
                    self.driver.notify(&SessionNotice::Error(err.into()));
                },
                SessionAction::FetchSnapshot { room, ticket } => {
                    let directory = Arc::clone(&self.directory);
                    self.pending.push(Box::pin(async move {
                        let result = directory.fetch_history(&room).await;
                        SessionEvent::SnapshotLoaded { room, ticket, result }
                    }));
                },
                SessionAction::CreateRoom { name } => {
                    let directory = Arc::clone(&self.directory);
                    self.pending.push(Box::pin(async move {
                        let result = directory.create_room(&name).await;
                        SessionEvent::RoomCreated { name, result }
                    }));
                },
                SessionAction::ListRooms => {
                    let directory = Arc::clone(&self.directory);
                    self.pending.push(Box::pin(async move {
                        SessionEvent::RoomsListed(directory.list_rooms().await)
                    }));
                },
                SessionAction::ListUsers => {
                    let directory = Arc::clone(&self.directory);
                    self.pending.push(Box::pin(async move {
                        SessionEvent::UsersListed(directory.list_users().await)
                    }));
                },
                SessionAction::Notify(notice) => self.driver.notify(&notice),
            }
        }

        self.driver.render(&self.session).map_err(RuntimeError::Driver)
    }
}
