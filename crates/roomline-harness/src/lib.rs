//! Deterministic simulation harness for Roomline.
//!
//! Runs the real [`roomline_app::Runtime`] against simulated collaborators:
//!
//! - [`SimEnv`]: virtual clock and seeded RNG
//! - [`SimRemote`]: in-memory chat server speaking the frame protocol
//! - [`SimDirectory`]: in-memory directory with holdable history fetches
//! - [`SimDriver`]: scripted user intents and world events
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties on every render. Use
//! [`InvariantRegistry::standard()`] for the standard set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_directory;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_remote;

pub use invariants::{
    ActiveRoomInStore, Invariant, InvariantRegistry, InvariantResult, JoinedOnlyActive,
    NoDuplicateDelivery, NoForeignOutbound, OneEntryPerRoom, SystemSnapshot, Violation,
};
pub use sim_directory::SimDirectory;
pub use sim_driver::{ScriptStep, SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_remote::SimRemote;
