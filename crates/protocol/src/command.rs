//! Command byte vocabulary shared by the host daemon and the remote peer.
//!
//! Every request on the link starts with a single command byte. Only the
//! browsing commands (SELECT, UNSELECT, READ, NAME, PART, FILE) are acted on
//! by the daemon; the remaining bytes belong to the wider handshake protocol
//! and are reserved.

use std::fmt;

use crate::error::ProtocolError;

/// A single command byte as sent over the link.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandByte {
    // Prefixes
    /// Request that requires an acknowledgement.
    Req = 0x00,
    /// Acknowledgement.
    Ack = 0x01,
    /// Negative acknowledgement.
    Nack = 0x02,

    // Handshake
    /// Connection request.
    Conn = 0x03,
    /// Shutdown request.
    Shut = 0x04,

    // Browsing
    /// Select a disk or a partition. A name buffer follows.
    Select = 0x05,
    /// Clear the current selection.
    Unselect = 0x06,
    /// Stream every file of the selected partition.
    Read = 0x07,
    /// Retry the previous operation.
    Ret = 0x08,

    // Listings
    /// List disk names.
    Name = 0x20,
    /// List partitions of the selected disk.
    Part = 0x21,
    /// List files of the selected partition.
    File = 0x22,
    /// Directory marker.
    Dir = 0x23,
    /// Bridge identifier.
    Bid = 0x24,

    /// Size indication.
    Size = 0xff,
}

impl CommandByte {
    /// Every command byte in the vocabulary.
    pub const ALL: [CommandByte; 15] = [
        CommandByte::Req,
        CommandByte::Ack,
        CommandByte::Nack,
        CommandByte::Conn,
        CommandByte::Shut,
        CommandByte::Select,
        CommandByte::Unselect,
        CommandByte::Read,
        CommandByte::Ret,
        CommandByte::Name,
        CommandByte::Part,
        CommandByte::File,
        CommandByte::Dir,
        CommandByte::Bid,
        CommandByte::Size,
    ];

    /// Raw wire value.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the byte belongs to the handshake protocol rather than the
    /// browsing engine.
    pub fn is_reserved(self) -> bool {
        !matches!(
            self,
            CommandByte::Select
                | CommandByte::Unselect
                | CommandByte::Read
                | CommandByte::Name
                | CommandByte::Part
                | CommandByte::File
        )
    }

    /// Whether the command is followed by a name buffer on the link.
    pub fn expects_name(self) -> bool {
        matches!(self, CommandByte::Select)
    }

    /// Mnemonic used in logs.
    pub fn mnemonic(self) -> &'static str {
        match self {
            CommandByte::Req => "REQ",
            CommandByte::Ack => "ACK",
            CommandByte::Nack => "NACK",
            CommandByte::Conn => "CONN",
            CommandByte::Shut => "SHUT",
            CommandByte::Select => "SELECT",
            CommandByte::Unselect => "UNSELECT",
            CommandByte::Read => "READ",
            CommandByte::Ret => "RET",
            CommandByte::Name => "NAME",
            CommandByte::Part => "PART",
            CommandByte::File => "FILE",
            CommandByte::Dir => "DIR",
            CommandByte::Bid => "BID",
            CommandByte::Size => "SIZE",
        }
    }
}

impl TryFrom<u8> for CommandByte {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        CommandByte::ALL
            .into_iter()
            .find(|command| command.as_byte() == byte)
            .ok_or(ProtocolError::UnknownCommand(byte))
    }
}

impl From<CommandByte> for u8 {
    fn from(command: CommandByte) -> Self {
        command.as_byte()
    }
}

impl fmt::Display for CommandByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.mnemonic(), self.as_byte())
    }
}
