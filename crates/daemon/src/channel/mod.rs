//! Duplex byte channel between the daemon and the remote peer.
//!
//! The engine only needs blocking `send`/`recv` with byte counts, plus a
//! framed receive for SELECT payloads. The
//! daemon binds the channel to a TCP stream ([`TcpChannel`]); tests drive
//! sessions through a [`ScriptedChannel`].

pub mod memory;
pub mod tcp;

use std::io;
use std::time::Duration;

use thiserror::Error;

pub use memory::{ScriptStep, ScriptedChannel};
pub use tcp::TcpChannel;

/// Errors raised by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer went away (EOF, reset, broken pipe).
    #[error("channel closed by peer")]
    Closed,

    /// The operation did not complete within its timeout.
    #[error("channel operation timed out")]
    Timeout,

    /// The channel accepted no bytes of a pending write.
    #[error("short write: {written} of {expected} bytes sent")]
    ShortWrite { written: usize, expected: usize },

    /// Any other I/O failure.
    #[error("channel I/O error: {0}")]
    Io(io::Error),
}

impl ChannelError {
    /// Whether the error means the peer is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => ChannelError::Closed,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ChannelError::Timeout,
            _ => ChannelError::Io(e),
        }
    }
}

/// A blocking duplex byte channel.
pub trait Channel {
    /// Send some of `buf`, returning how many bytes were accepted.
    fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError>;

    /// Receive into `buf`, returning how many bytes arrived (at least one).
    ///
    /// End of stream is reported as [`ChannelError::Closed`].
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;

    /// Receive one SELECT payload into `buf`, returning its length.
    ///
    /// Packet channels hand over one payload per receive, which is the
    /// default. Stream channels have no packet boundaries and must read a
    /// whole frame instead.
    fn recv_name(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.recv(buf)
    }

    /// Bound the next receives. `None` waits forever.
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Bound subsequent sends. `None` waits forever.
    fn set_write_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), ChannelError> {
        Ok(())
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        (**self).send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).recv(buf)
    }

    fn recv_name(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).recv_name(buf)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        (**self).set_read_timeout(timeout)
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        (**self).set_write_timeout(timeout)
    }
}

/// Send all of `buf`, retrying partial sends.
pub fn send_all<C: Channel + ?Sized>(channel: &mut C, buf: &[u8]) -> Result<(), ChannelError> {
    let mut written = 0;
    while written < buf.len() {
        match channel.send(&buf[written..])? {
            0 => {
                return Err(ChannelError::ShortWrite {
                    written,
                    expected: buf.len(),
                })
            }
            n => written += n,
        }
    }
    Ok(())
}
