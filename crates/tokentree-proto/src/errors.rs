//! Protocol error types.

use std::io;

use thiserror::Error;

/// Result alias for framing and payload operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while framing, parsing, or (de)serializing wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the data it claims to hold
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header does not start with the protocol magic
    #[error("invalid magic number: {0:#06x}")]
    InvalidMagic(u16),

    /// Header carries a version this build does not speak
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Header carries an opcode with no payload mapping
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Payload exceeds [`crate::FrameHeader::MAX_PAYLOAD_SIZE`]
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Protocol maximum
        max: usize,
    },

    /// CBOR serialization failed
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}

impl ProtocolError {
    /// Returns true if more bytes could turn this error into a successful
    /// decode.
    ///
    /// Stream readers use this to distinguish "wait for more data" from a
    /// corrupt or hostile peer.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::FrameTooShort { .. })
    }
}

/// Boundary conversion for async I/O code paths.
impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        let kind = match &err {
            ProtocolError::FrameTooShort { .. } => io::ErrorKind::UnexpectedEof,
            ProtocolError::InvalidMagic(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::UnknownOpcode(_)
            | ProtocolError::PayloadTooLarge { .. }
            | ProtocolError::CborDecode(_) => io::ErrorKind::InvalidData,
            ProtocolError::CborEncode(_) => io::ErrorKind::InvalidInput,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_short_frames_are_incomplete() {
        assert!(ProtocolError::FrameTooShort { expected: 8, actual: 3 }.is_incomplete());

        assert!(!ProtocolError::InvalidMagic(0xDEAD).is_incomplete());
        assert!(!ProtocolError::UnsupportedVersion(9).is_incomplete());
        assert!(!ProtocolError::UnknownOpcode(0xFF).is_incomplete());
        assert!(!ProtocolError::CborDecode("eof".to_string()).is_incomplete());
    }

    #[test]
    fn io_conversion_preserves_category() {
        let err: io::Error = ProtocolError::InvalidMagic(0xDEAD).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err: io::Error = ProtocolError::FrameTooShort { expected: 8, actual: 0 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
