//! Application layer for Roomline
//!
//! Pure state machines plus a generic async runtime. The same session code
//! runs in production and in deterministic simulation; only the [`Driver`]
//! and [`Directory`] implementations differ.
//!
//! # Components
//!
//! - [`RoomStore`]: Rooms the user knows about and which one is active
//! - [`MessageReconciler`]: Per-room ordered logs merged from snapshots, live
//!   events and system notices
//! - [`ChatSession`]: Composition root wiring the store, reconciler and
//!   connection manager together
//! - [`Directory`]: Request/response collaborator (rooms, users, history)
//! - [`Driver`]: Platform-specific I/O
//! - [`Runtime`]: Event loop driving a session through a driver

#![forbid(unsafe_code)]

mod action;
mod directory;
mod driver;
mod error;
mod event;
mod reconciler;
mod rooms;
mod runtime;
mod session;

pub use action::{SessionAction, SessionNotice};
pub use directory::{Directory, DirectoryError};
pub use driver::{Driver, DriverInput, TransportEvent, UserIntent};
pub use error::{RuntimeError, SessionError};
pub use event::{ActivationTicket, SessionEvent};
pub use reconciler::MessageReconciler;
pub use rooms::RoomStore;
pub use runtime::{Runtime, RuntimeConfig};
pub use session::ChatSession;
