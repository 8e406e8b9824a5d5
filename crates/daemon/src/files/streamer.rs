//! Chunked file streaming through a staging copy.
//!
//! Each file is first copied into a uniquely named temporary file inside the
//! staging directory, then sent from that copy in [`CHUNK_SIZE`] chunks. The
//! staging copy is removed when it goes out of scope, whether streaming
//! succeeded or not.

use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use protocol::CHUNK_SIZE;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::channel::{send_all, Channel, ChannelError};

/// Errors that can occur while streaming a file.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The staging copy could not be made.
    #[error("failed to stage {}: {source}", .path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The staging copy could not be read.
    #[error("failed to read staged copy of {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The channel failed mid-stream.
    #[error("transport failure while streaming: {0}")]
    Transport(#[from] ChannelError),
}

impl StreamError {
    /// Whether the failure is confined to this file.
    pub fn is_file_local(&self) -> bool {
        !matches!(self, StreamError::Transport(_))
    }
}

/// Outcome of streaming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Bytes sent.
    pub bytes: u64,
    /// Chunks sent.
    pub chunks: u64,
    /// Hex-encoded SHA-256 of the bytes sent.
    pub sha256: String,
}

/// Streams files to a channel in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct FileStreamer {
    staging_dir: PathBuf,
}

impl FileStreamer {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Copy `source` into a fresh staging file, rewound to the start.
    pub fn stage(&self, source: &Path) -> Result<NamedTempFile, StreamError> {
        let stage_err = |e: io::Error| StreamError::Stage {
            path: source.to_path_buf(),
            source: e,
        };

        let mut input = File::open(source).map_err(stage_err)?;
        fs::create_dir_all(&self.staging_dir).map_err(stage_err)?;

        let mut staged = tempfile::Builder::new()
            .prefix("stage-")
            .tempfile_in(&self.staging_dir)
            .map_err(stage_err)?;
        io::copy(&mut input, staged.as_file_mut()).map_err(stage_err)?;
        staged.as_file_mut().rewind().map_err(stage_err)?;

        Ok(staged)
    }

    /// Send the content of `source` to `channel`.
    ///
    /// Every chunk but the last is exactly [`CHUNK_SIZE`] bytes. An empty
    /// file sends nothing.
    pub fn stream<C: Channel + ?Sized>(
        &self,
        source: &Path,
        channel: &mut C,
    ) -> Result<StreamReport, StreamError> {
        let mut staged = self.stage(source)?;
        debug!(path = %source.display(), staged = %staged.path().display(), "file staged");

        let mut chunk = [0u8; CHUNK_SIZE];
        let mut hasher = Sha256::new();
        let mut report = StreamReport {
            bytes: 0,
            chunks: 0,
            sha256: String::new(),
        };

        loop {
            let filled = fill_chunk(staged.as_file_mut(), &mut chunk).map_err(|e| {
                StreamError::Read {
                    path: source.to_path_buf(),
                    source: e,
                }
            })?;
            if filled == 0 {
                break;
            }

            send_all(channel, &chunk[..filled])?;
            hasher.update(&chunk[..filled]);
            report.bytes += filled as u64;
            report.chunks += 1;

            if filled < CHUNK_SIZE {
                break;
            }
        }

        report.sha256 = hex::encode(hasher.finalize());
        debug!(
            path = %source.display(),
            bytes = report.bytes,
            chunks = report.chunks,
            sha256 = %report.sha256,
            "file streamed"
        );
        Ok(report)
    }
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
