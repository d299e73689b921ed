//! Binary framing for networked transports.
//!
//! Layout on the wire (Big Endian):
//!
//! ```text
//! [magic: u16][version: u8][opcode: u8][payload_size: u32][payload: payload_size bytes]
//! ```
//!
//! The header is validated before any payload byte is looked at, so a reader
//! can reject garbage after eight bytes and never allocates more than
//! [`FrameHeader::MAX_PAYLOAD_SIZE`].

use bytes::{BufMut, Bytes};

use crate::errors::{ProtocolError, Result};

/// Fixed 8-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    opcode: u8,
    payload_size: u32,
}

impl FrameHeader {
    /// Serialized header size.
    pub const SIZE: usize = 8;

    /// Magic number: "TT" in ASCII.
    pub const MAGIC: u16 = 0x5454;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB).
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Header for a payload of `payload_size` bytes.
    #[must_use]
    pub const fn new(opcode: u8, payload_size: u32) -> Self {
        Self { opcode, payload_size }
    }

    /// Parse and validate a header from the front of `bytes`.
    ///
    /// Checks are ordered cheapest first: length, magic, version, size. The
    /// opcode is not interpreted here; unknown opcodes surface when the
    /// payload is mapped to a message.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.first_chunk::<{ FrameHeader::SIZE }>() else {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        };

        let magic = u16::from_be_bytes([raw[0], raw[1]]);
        if magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        if raw[2] != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(raw[2]));
        }

        let payload_size = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(Self { opcode: raw[3], payload_size })
    }

    /// Serialize to network bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&Self::MAGIC.to_be_bytes());
        out[2] = Self::VERSION;
        out[3] = self.opcode;
        out[4..8].copy_from_slice(&self.payload_size.to_be_bytes());
        out
    }

    /// Raw opcode byte.
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Payload length in bytes.
    #[must_use]
    pub const fn payload_size(&self) -> u32 {
        self.payload_size
    }
}

/// Header plus raw (already encoded) payload bytes.
///
/// # Invariants
///
/// - `payload.len()` equals `header.payload_size()`. [`Frame::new`] sets the
///   size from the payload and [`Frame::decode`] reads exactly that many bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Raw payload bytes (CBOR)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, deriving `payload_size` from the payload.
    ///
    /// Oversized payloads are accepted here and rejected by [`Frame::encode`].
    /// Lengths beyond `u32::MAX` saturate, which still fails the size check.
    #[must_use]
    pub fn new(opcode: u8, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self { header: FrameHeader::new(opcode, size), payload }
    }

    /// Write header and payload into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode one frame from the front of `bytes`.
    ///
    /// Returns the frame and the number of bytes it occupied. Trailing bytes
    /// are left for the next call.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(bytes)?;
        let total = FrameHeader::SIZE + header.payload_size() as usize;

        let Some(payload) = bytes.get(FrameHeader::SIZE..total) else {
            return Err(ProtocolError::FrameTooShort { expected: total, actual: bytes.len() });
        };

        Ok((Self { header, payload: Bytes::copy_from_slice(payload) }, total))
    }
}
