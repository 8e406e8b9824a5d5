//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering malformed command bytes and names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte is not part of the command vocabulary.
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    // Name errors
    /// Name does not fit in a name frame.
    #[error("name too long: {len} bytes exceeds maximum of {max} bytes")]
    NameTooLong {
        /// Actual name length in bytes.
        len: usize,
        /// Maximum allowed length in bytes.
        max: usize,
    },

    /// Names must contain at least one byte.
    #[error("name is empty")]
    EmptyName,

    /// NUL is the frame terminator and cannot appear inside a name.
    #[error("name contains a NUL byte at offset {0}")]
    EmbeddedNul(usize),

    /// Name bytes are not valid UTF-8.
    #[error("name is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(err: std::str::Utf8Error) -> Self {
        ProtocolError::InvalidUtf8(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_command_display() {
        let err = ProtocolError::UnknownCommand(0x42);
        assert_eq!(err.to_string(), "unknown command byte: 0x42");
    }

    #[test]
    fn test_name_too_long_display() {
        let err = ProtocolError::NameTooLong { len: 300, max: 255 };
        assert_eq!(
            err.to_string(),
            "name too long: 300 bytes exceeds maximum of 255 bytes"
        );
    }

    #[test]
    fn test_embedded_nul_display() {
        let err = ProtocolError::EmbeddedNul(3);
        assert_eq!(err.to_string(), "name contains a NUL byte at offset 3");
    }

    #[test]
    fn test_from_utf8_error() {
        let bytes = [0xff, 0xfe];
        let err: ProtocolError = std::str::from_utf8(&bytes).unwrap_err().into();
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
    }
}
