//! # diskbridge Protocol Library
//!
//! Wire vocabulary for the diskbridge link between a host daemon and a
//! remote peer browsing the host's storage.
//!
//! ## Overview
//!
//! The link is a plain duplex byte channel. The peer sends one command byte
//! at a time and the host answers with:
//!
//! - **Name frames**: fixed 256-byte, NUL-padded frames, one per disk,
//!   partition or file name
//! - **File chunks**: raw file content in 1024-byte chunks
//!
//! ```text
//! peer                                   host
//!  │  NAME (0x20)                         │
//!  │ ───────────────────────────────────▶ │
//!  │        "sda\0\0…" "sdb\0\0…" (256 B) │
//!  │ ◀─────────────────────────────────── │
//!  │  SELECT (0x05) + "sdb"               │
//!  │ ───────────────────────────────────▶ │
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{decode_name, BoundedName, CommandByte, NAME_FRAME_LEN};
//!
//! let command = CommandByte::try_from(0x20).unwrap();
//! assert_eq!(command, CommandByte::Name);
//!
//! let frame = BoundedName::new("sda1").unwrap().to_frame();
//! assert_eq!(frame.as_bytes().len(), NAME_FRAME_LEN);
//!
//! // A peer may echo the frame back as a SELECT payload.
//! assert_eq!(decode_name(frame.as_bytes()).unwrap(), "sda1");
//! ```
//!
//! ## Modules
//!
//! - [`command`]: Command byte vocabulary
//! - [`framing`]: Name frames, SELECT buffer decoding and transfer sizes
//! - [`error`]: Error types

pub mod command;
pub mod error;
pub mod framing;

pub use command::CommandByte;
pub use error::{ProtocolError, Result};
pub use framing::{
    chunk_count, decode_name, BoundedName, NameFrame, CHUNK_SIZE, MAX_NAME_LEN, MAX_PATH_LEN,
    NAME_FRAME_LEN, PATH_FIELD_LEN, SELECT_BUFFER_LEN,
};
