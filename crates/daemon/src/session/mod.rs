//! Session handling.
//!
//! A session is one peer connection. It owns the hierarchy and selection for
//! that peer and is torn down with the channel.

pub mod driver;

pub use driver::{
    Session, SessionEnd, SessionOptions, SessionReport, DEFAULT_MAX_CONSECUTIVE_ERRORS,
};
