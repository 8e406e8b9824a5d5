//! The per-connection command loop.

use std::time::Duration;

use protocol::{CommandByte, SELECT_BUFFER_LEN};
use tracing::{debug, info, warn};

use crate::channel::{send_all, Channel, ChannelError};
use crate::engine::{Dispatcher, Request, Response, Selection};
use crate::files::{FileStreamer, StreamError};
use crate::storage::StorageEnumerator;

/// Consecutive failed command reads tolerated before giving up on the peer.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 16;

/// Tunables of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Maximum wait for the next command byte. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Maximum wait for a SELECT payload or a write.
    pub io_timeout: Option<Duration>,
    /// Consecutive failed command reads treated as a disconnect.
    pub max_consecutive_errors: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            io_timeout: Some(Duration::from_secs(30)),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the channel.
    Disconnected,
    /// No command arrived within the idle timeout.
    IdleTimeout,
    /// Too many consecutive transport failures.
    TooManyErrors,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub commands: u64,
    pub files_streamed: u64,
    pub bytes_streamed: u64,
    pub end: SessionEnd,
}

/// Drives one peer connection until it goes away.
pub struct Session<C, E> {
    channel: C,
    dispatcher: Dispatcher<E>,
    streamer: FileStreamer,
    options: SessionOptions,
    selection: Selection,
    files_streamed: u64,
    bytes_streamed: u64,
}

impl<C: Channel, E: StorageEnumerator> Session<C, E> {
    pub fn new(
        channel: C,
        dispatcher: Dispatcher<E>,
        streamer: FileStreamer,
        options: SessionOptions,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            streamer,
            options,
            selection: Selection::None,
            files_streamed: 0,
            bytes_streamed: 0,
        }
    }

    /// Load the disk list and serve commands until the channel closes.
    pub fn run(mut self) -> SessionReport {
        if let Err(e) = self.dispatcher.refresh(&mut self.selection) {
            warn!(error = %e, "failed to enumerate disks, starting with an empty list");
        }
        if let Err(e) = self.channel.set_write_timeout(self.options.io_timeout) {
            warn!(error = %e, "failed to set write timeout");
        }

        let mut commands = 0u64;
        let mut consecutive_errors = 0u32;

        let end = loop {
            let byte = match self.next_command() {
                Ok(byte) => {
                    consecutive_errors = 0;
                    byte
                }
                Err(ChannelError::Closed) => break SessionEnd::Disconnected,
                Err(ChannelError::Timeout) if self.options.idle_timeout.is_some() => {
                    break SessionEnd::IdleTimeout
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(error = %e, consecutive_errors, "failed to read command");
                    if consecutive_errors >= self.options.max_consecutive_errors {
                        break SessionEnd::TooManyErrors;
                    }
                    continue;
                }
            };

            commands += 1;
            match self.handle(byte) {
                Ok(()) => {}
                Err(ChannelError::Closed) => break SessionEnd::Disconnected,
                Err(e) => warn!(error = %e, command = byte, "command aborted"),
            }
        };

        info!(
            commands,
            files = self.files_streamed,
            bytes = self.bytes_streamed,
            end = ?end,
            "session ended"
        );

        SessionReport {
            commands,
            files_streamed: self.files_streamed,
            bytes_streamed: self.bytes_streamed,
            end,
        }
    }

    fn next_command(&mut self) -> Result<u8, ChannelError> {
        self.channel.set_read_timeout(self.options.idle_timeout)?;
        let mut byte = [0u8; 1];
        match self.channel.recv(&mut byte)? {
            0 => Err(ChannelError::Closed),
            _ => Ok(byte[0]),
        }
    }

    /// Process one command byte, including its payload and response.
    fn handle(&mut self, byte: u8) -> Result<(), ChannelError> {
        let request = match CommandByte::try_from(byte) {
            Ok(command) if command.expects_name() => Request::Select(self.read_name()?),
            _ => Request::from(byte),
        };
        debug!(?request, "dispatching");

        match self.dispatcher.dispatch(&mut self.selection, request) {
            Response::Nothing => Ok(()),
            Response::Names(frames) => {
                for frame in &frames {
                    send_all(&mut self.channel, frame.as_bytes())?;
                }
                debug!(frames = frames.len(), "names sent");
                Ok(())
            }
            Response::Files(paths) => {
                for path in &paths {
                    match self.streamer.stream(path, &mut self.channel) {
                        Ok(report) => {
                            self.files_streamed += 1;
                            self.bytes_streamed += report.bytes;
                        }
                        Err(StreamError::Transport(e)) => return Err(e),
                        Err(e) => warn!(path = %path.display(), error = %e, "skipping file"),
                    }
                }
                Ok(())
            }
        }
    }

    fn read_name(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.channel.set_read_timeout(self.options.io_timeout)?;
        let mut buffer = [0u8; SELECT_BUFFER_LEN];
        let received = self.channel.recv_name(&mut buffer)?;
        Ok(buffer[..received].to_vec())
    }
}
