//! Roomline wire protocol
//!
//! Frames exchanged over the real-time chat channel. Each frame is a fixed
//! 16-byte binary header followed by a CBOR payload whose type is selected by
//! the header's opcode.
//!
//! # Components
//!
//! - [`FrameHeader`]: Fixed binary header (magic, version, opcode, sizes)
//! - [`Frame`]: Header plus raw payload bytes
//! - [`Payload`]: Typed view of a frame's payload
//! - [`Opcode`]: Frame type discriminator

#![forbid(unsafe_code)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::Payload;
