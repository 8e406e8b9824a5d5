//! Fixed-width framing for names and file chunks.
//!
//! # Name frames
//!
//! Disk, partition and file names travel as fixed 256-byte frames: the name
//! bytes followed by NUL padding. One byte is always left for the terminator,
//! so a name holds at most 255 bytes.
//!
//! # SELECT buffer
//!
//! The peer sends the name to select as a raw buffer of at most 256 bytes.
//! The sender is not required to terminate it; the receiver terminates it at
//! the received byte count and at the first NUL, which also accepts a name
//! frame echoed back verbatim.
//!
//! # File chunks
//!
//! File content is a sequence of 1024-byte chunks, the last one possibly
//! short. There is no end-of-file marker.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Size of a name frame on the wire.
pub const NAME_FRAME_LEN: usize = 256;

/// Longest name that fits in a frame together with its terminator.
pub const MAX_NAME_LEN: usize = NAME_FRAME_LEN - 1;

/// Size of the buffer the SELECT name is read into.
pub const SELECT_BUFFER_LEN: usize = 256;

/// Size of one file content chunk.
pub const CHUNK_SIZE: usize = 1024;

/// Size of a path field, terminator included.
pub const PATH_FIELD_LEN: usize = 1024;

/// Longest absolute path that fits in a path field.
pub const MAX_PATH_LEN: usize = PATH_FIELD_LEN - 1;

/// Number of chunks needed to carry `len` bytes.
#[inline]
pub fn chunk_count(len: u64) -> u64 {
    len.div_ceil(CHUNK_SIZE as u64)
}

/// A name that is guaranteed to fit in a [`NameFrame`].
///
/// Holds 1 to [`MAX_NAME_LEN`] bytes of UTF-8 with no NUL bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoundedName(String);

impl BoundedName {
    /// Validate and wrap a name. Overlong names are rejected, never truncated.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProtocolError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ProtocolError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if let Some(offset) = name.bytes().position(|b| b == 0) {
            return Err(ProtocolError::EmbeddedNul(offset));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode into a fixed-width frame.
    pub fn to_frame(&self) -> NameFrame {
        NameFrame::from(self)
    }
}

impl Deref for BoundedName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BoundedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for BoundedName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BoundedName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for BoundedName {
    type Error = ProtocolError;

    fn try_from(name: String) -> Result<Self> {
        Self::new(name)
    }
}

impl TryFrom<&str> for BoundedName {
    type Error = ProtocolError;

    fn try_from(name: &str) -> Result<Self> {
        Self::new(name)
    }
}

impl From<BoundedName> for String {
    fn from(name: BoundedName) -> Self {
        name.0
    }
}

impl fmt::Display for BoundedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fixed-width, NUL-padded name frame.
#[derive(Clone, PartialEq, Eq)]
pub struct NameFrame([u8; NAME_FRAME_LEN]);

impl NameFrame {
    /// Raw frame bytes, always [`NAME_FRAME_LEN`] long.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name carried by this frame.
    pub fn name(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        // Frames are only built from a BoundedName, so the prefix is UTF-8.
        std::str::from_utf8(&self.0[..end]).unwrap_or_default()
    }
}

impl From<&BoundedName> for NameFrame {
    fn from(name: &BoundedName) -> Self {
        let mut bytes = [0u8; NAME_FRAME_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Self(bytes)
    }
}

impl fmt::Debug for NameFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NameFrame").field(&self.name()).finish()
    }
}

/// Decode a received name buffer.
///
/// The buffer must already be cut to the received byte count. Everything
/// from the first NUL onwards is ignored.
pub fn decode_name(buffer: &[u8]) -> Result<BoundedName> {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    let bytes = &buffer[..end];
    if bytes.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong {
            len: bytes.len(),
            max: MAX_NAME_LEN,
        });
    }
    let name = std::str::from_utf8(bytes)?;
    BoundedName::new(name)
}
