//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O. Each
//! frontend implements it to provide user input, a transport and rendering,
//! while the generic [`crate::Runtime`] handles all orchestration.

use std::future::Future;

use roomline_core::{Credential, Environment, RoomId};
use roomline_proto::Frame;

use crate::{ChatSession, SessionNotice};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    /// Switch to a known room
    Activate(RoomId),
    /// Send text to the active room
    Send(String),
    /// Create a public room
    CreateRoom(String),
    /// Open a direct room with another user
    StartDirect(String),
    /// Re-fetch room and user lists
    Refresh,
    /// Connect again after `Failed` or a disconnect
    Reconnect,
    /// Leave the application
    Quit,
}

/// Something the transport reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Inbound frame
    Frame(Frame),
    /// The transport went away
    Closed {
        /// Failure description
        reason: String,
    },
}

/// Next input for the runtime, from whichever source was ready first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverInput {
    /// User input
    Intent(UserIntent),
    /// Transport input
    Transport(TransportEvent),
}

/// Abstracts I/O operations for the runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration. The same orchestration
/// code runs in production and in simulation.
///
/// # Implementations
///
/// - **CLI**: stdin lines for intents, QUIC for the transport
/// - **Simulation**: scripted intents and an in-memory remote
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait for the next user intent or transport event.
    ///
    /// Must be cancel-safe: the runtime drops the future when another source
    /// becomes ready first.
    fn next_input(&mut self) -> impl Future<Output = Result<DriverInput, Self::Error>> + Send;

    /// Open a transport to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established. The runtime
    /// reports it to the session as a transport failure.
    fn open(
        &mut self,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the send fails.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Tear down the current transport, if any.
    fn close(&mut self, reason: &str);

    /// Render session state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails. Rendering errors end the runtime.
    fn render<E: Environment>(&mut self, session: &ChatSession<E>) -> Result<(), Self::Error>;

    /// Show a status or error notice.
    fn notify(&mut self, notice: &SessionNotice);

    /// Release resources before the runtime exits.
    fn stop(&mut self);
}
