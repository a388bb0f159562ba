//! Terminal client for Roomline
//!
//! A thin shell over [`roomline_app::Driver`] that reads commands line by
//! line and prints the active room. All orchestration lives in the generic
//! [`roomline_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod terminal;

pub use command::{CommandError, Input};
pub use terminal::{TerminalDriver, TerminalError};
