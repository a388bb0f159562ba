//! Production I/O for Roomline
//!
//! Everything that touches the operating system or the network lives here, so
//! the session logic in `roomline-app` stays deterministic.
//!
//! # Components
//!
//! - [`SystemEnv`]: Real clock, OS randomness and tokio sleep
//! - [`transport`]: QUIC transport for the real-time channel (`transport`
//!   feature)
//! - [`http`]: HTTP implementation of the directory service (`http` feature)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod system_env;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "transport")]
pub mod transport;

pub use system_env::SystemEnv;
