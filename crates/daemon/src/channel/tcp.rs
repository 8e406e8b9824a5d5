//! Channel over a blocking TCP stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use super::{Channel, ChannelError};

/// A [`Channel`] backed by a connected [`TcpStream`].
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// A handle that can shut the connection down from another thread.
    pub fn shutdown_handle(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        loop {
            match self.stream.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return Ok(result?),
            }
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        loop {
            match self.stream.read(buf) {
                Ok(0) if !buf.is_empty() => return Err(ChannelError::Closed),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return Ok(result?),
            }
        }
    }

    /// Read a whole name frame. A stream keeps no packet boundaries, so the
    /// payload is always the full NUL-padded frame and pipelined command
    /// bytes stay in the stream.
    fn recv_name(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.stream.read_exact(buf)?;
        Ok(buf.len())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ChannelError> {
        Ok(self.stream.set_write_timeout(timeout)?)
    }
}
