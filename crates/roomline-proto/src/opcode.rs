//! Frame opcodes.

/// Operation code carried in every frame header.
///
/// Ranges:
/// - `0x0001..=0x00FF`: session management
/// - `0x0100..=0x01FF`: client commands
/// - `0x0200..=0x02FF`: server events
/// - `0x0FFF`: error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake carrying the credential
    Hello = 0x0001,
    /// Server handshake acceptance
    HelloReply = 0x0002,
    /// Graceful disconnect
    Goodbye = 0x0003,
    /// Keepalive request
    Ping = 0x0004,
    /// Keepalive response
    Pong = 0x0005,

    /// Subscribe to a room's events
    JoinRoom = 0x0100,
    /// Unsubscribe from a room's events
    LeaveRoom = 0x0101,
    /// Publish a message to a room
    SendMessage = 0x0102,

    /// A message published to a joined room
    MessageReceived = 0x0200,
    /// A server-originated notice for a room
    SystemNotice = 0x0201,

    /// Error response
    Error = 0x0FFF,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x0100 => Some(Self::JoinRoom),
            0x0101 => Some(Self::LeaveRoom),
            0x0102 => Some(Self::SendMessage),
            0x0200 => Some(Self::MessageReceived),
            0x0201 => Some(Self::SystemNotice),
            0x0FFF => Some(Self::Error),
            _ => None,
        }
    }

    /// True for opcodes only a client may send.
    #[must_use]
    pub const fn is_client_command(self) -> bool {
        matches!(self, Self::Hello | Self::JoinRoom | Self::LeaveRoom | Self::SendMessage)
    }
}
