//! Line-oriented terminal driver.
//!
//! Implements [`Driver`] over a line reader and a writer: stdin and stdout in
//! the binary, byte buffers in tests. The real-time channel is a QUIC
//! connection from [`roomline_client::transport`].
//!
//! Rendering is incremental. Each render prints only what changed since the
//! previous one: the room list, the user list, and new entries of the active
//! room's log. Switching rooms, or a snapshot replacing the visible log,
//! reprints the log under a header.

use std::io::{self, Stdout, Write};

use roomline_app::{ChatSession, Driver, DriverInput, SessionNotice, TransportEvent, UserIntent};
use roomline_client::transport::{self, ConnectedClient, TransportError};
use roomline_core::{
    ConnectionState, Credential, Environment, Message, Origin, Room, RoomId, RoomKind,
};
use roomline_proto::Frame;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

use crate::command::{self, HELP, Input};

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error from the terminal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame sent with no open transport.
    #[error("not connected")]
    NotConnected,
}

/// What the terminal currently shows.
#[derive(Debug, Default)]
struct View {
    room: Option<RoomId>,
    shown: Vec<Message>,
    rooms: Vec<RoomId>,
    users: Vec<String>,
}

/// Terminal driver implementing the [`Driver`] trait.
pub struct TerminalDriver<R, W> {
    lines: Lines<R>,
    out: W,
    server_addr: String,
    connection: Option<ConnectedClient>,
    view: View,
}

impl TerminalDriver<BufReader<Stdin>, Stdout> {
    /// Driver reading commands from stdin and printing to stdout.
    pub fn stdio(server_addr: String) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), io::stdout(), server_addr)
    }
}

impl<R, W> TerminalDriver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    /// Driver over arbitrary input and output.
    pub fn new(input: R, out: W, server_addr: String) -> Self {
        Self { lines: input.lines(), out, server_addr, connection: None, view: View::default() }
    }

    /// Output written so far.
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn write_rooms(&mut self, rooms: &[Room], me: &str) -> io::Result<()> {
        let ids: Vec<RoomId> = rooms.iter().map(|room| room.id.clone()).collect();
        if ids == self.view.rooms {
            return Ok(());
        }
        let labels: Vec<String> = rooms.iter().map(|room| label(room, me)).collect();
        writeln!(self.out, "rooms: {}", labels.join(", "))?;
        self.view.rooms = ids;
        Ok(())
    }

    fn write_users(&mut self, users: &[String]) -> io::Result<()> {
        if users == self.view.users.as_slice() {
            return Ok(());
        }
        writeln!(self.out, "users: {}", users.join(", "))?;
        self.view.users = users.to_vec();
        Ok(())
    }

    fn write_log(&mut self, title: &str, room: &RoomId, log: &[Message]) -> io::Result<()> {
        let switched = self.view.room.as_ref() != Some(room);
        if switched || !log.starts_with(&self.view.shown) {
            writeln!(self.out, "== {title} ==")?;
            self.view.room = Some(room.clone());
            self.view.shown.clear();
        }

        for message in log.iter().skip(self.view.shown.len()) {
            write_message(&mut self.out, message)?;
        }
        self.view.shown = log.to_vec();
        Ok(())
    }
}

fn label(room: &Room, me: &str) -> String {
    match room.kind {
        RoomKind::Public => format!("#{}", room.display_name(me)),
        RoomKind::Direct => format!("@{}", room.display_name(me)),
    }
}

fn write_message(out: &mut impl Write, message: &Message) -> io::Result<()> {
    let at = message.sent_at.format("%H:%M:%S");
    match message.origin {
        Origin::System => writeln!(out, "[{at}] * {}", message.text),
        Origin::Live | Origin::Snapshot => {
            writeln!(out, "[{at}] <{}> {}", message.sender, message.text)
        },
    }
}

fn describe(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".to_string(),
        ConnectionState::Connecting => "connecting".to_string(),
        ConnectionState::Connected => "connected".to_string(),
        ConnectionState::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
        ConnectionState::Failed { reason } => format!("failed: {reason} (use /reconnect)"),
    }
}

async fn recv(connection: Option<&mut ConnectedClient>) -> Option<Frame> {
    match connection {
        Some(connection) => connection.from_server.recv().await,
        None => std::future::pending().await,
    }
}

impl<R, W> Driver for TerminalDriver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    type Error = TerminalError;

    async fn next_input(&mut self) -> Result<DriverInput, TerminalError> {
        loop {
            tokio::select! {
                line = self.lines.next_line() => {
                    let Some(line) = line? else {
                        return Ok(DriverInput::Intent(UserIntent::Quit));
                    };
                    match command::parse(&line) {
                        Ok(Input::Intent(intent)) => return Ok(DriverInput::Intent(intent)),
                        Ok(Input::Help) => writeln!(self.out, "{HELP}")?,
                        Ok(Input::Blank) => {},
                        Err(err) => writeln!(self.out, "{err}")?,
                    }
                    self.out.flush()?;
                },
                frame = recv(self.connection.as_mut()) => {
                    let event = match frame {
                        Some(frame) => TransportEvent::Frame(frame),
                        None => {
                            self.connection = None;
                            TransportEvent::Closed { reason: "server closed the connection".into() }
                        },
                    };
                    return Ok(DriverInput::Transport(event));
                },
            }
        }
    }

    async fn open(&mut self, _credential: &Credential) -> Result<(), TerminalError> {
        if let Some(previous) = self.connection.take() {
            previous.stop();
        }
        debug!(server = %self.server_addr, "opening transport");
        self.connection = Some(transport::connect(&self.server_addr).await?);
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), TerminalError> {
        let Some(connection) = &self.connection else {
            return Err(TerminalError::NotConnected);
        };
        let to_server = connection.to_server.clone();
        to_server.send(frame).await.map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        if let Some(connection) = self.connection.take() {
            debug!(reason, "closing transport");
            connection.stop();
        }
    }

    fn render<E: Environment>(&mut self, session: &ChatSession<E>) -> Result<(), TerminalError> {
        let me = session.username();
        self.write_rooms(session.rooms().list_rooms(), me)?;
        self.write_users(session.users())?;

        if let Some(active) = session.active_room() {
            let title = session.rooms().get(active).map_or_else(|| active.to_string(), |r| label(r, me));
            self.write_log(&title, active, session.log(active))?;
        }

        self.out.flush()?;
        Ok(())
    }

    fn notify(&mut self, notice: &SessionNotice) {
        let written = match notice {
            SessionNotice::StateChanged(state) => writeln!(self.out, "-- {}", describe(state)),
            SessionNotice::RoomActivated(_) => Ok(()),
            SessionNotice::Error(err) => {
                if !err.is_user_correctable() {
                    warn!(error = %err, "session error");
                }
                writeln!(self.out, "!! {err}")
            },
        };
        if let Err(err) = written.and_then(|()| self.out.flush()) {
            warn!(error = %err, "failed to write notice");
        }
    }

    fn stop(&mut self) {
        self.close("shutting down");
        if let Err(err) = self.out.flush() {
            warn!(error = %err, "failed to flush output");
        }
    }
}
