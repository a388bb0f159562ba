//! Roomline core
//!
//! Sans-IO building blocks of the chat client. Nothing in this crate performs
//! I/O or reads the system clock: time and entropy come from the caller, and
//! side effects are returned as actions for a driver to execute.
//!
//! # Components
//!
//! - [`env::Environment`]: Time and randomness abstraction
//! - [`room`]: Room identifiers and the direct-room resolver
//! - [`message`]: Log entries and outgoing intents
//! - [`session::SessionContext`]: Authenticated username and credential
//! - [`connection::ConnectionManager`]: Real-time channel lifecycle

#![forbid(unsafe_code)]

pub mod connection;
pub mod env;
pub mod error;
pub mod message;
pub mod room;
pub mod session;

pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState,
    ReconnectPolicy,
};
pub use env::Environment;
pub use error::{ConnectionError, RoomError};
pub use message::{Message, Origin, OutgoingMessage, SYSTEM_SENDER, Timestamp};
pub use room::{DirectRoomResolver, Room, RoomId, RoomKind};
pub use session::{Credential, SessionContext};
