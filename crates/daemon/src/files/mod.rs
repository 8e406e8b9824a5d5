//! File content streaming.
//!
//! Files are staged into a scratch copy and sent in fixed-size chunks. See
//! [`streamer`] for the details.

pub mod streamer;

pub use streamer::{FileStreamer, StreamError, StreamReport};
