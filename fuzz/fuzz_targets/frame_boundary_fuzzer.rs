//! Fuzz target for frame header boundary conditions
//!
//! # Strategy
//!
//! - Magic: valid, off-by-one, all-zeros, random
//! - Version: valid, zero, random
//! - Payload size: zero, small, at-max, just-over-max, `u32::MAX`
//! - Body: shorter than, equal to, or longer than the claimed size
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` MUST return `PayloadTooLarge`
//! - Invalid magic MUST return `InvalidMagic`
//! - A truncated body MUST return `FrameTooShort`, which readers treat as
//!   "wait for more bytes"
//! - A valid frame consumes exactly `8 + payload_size` bytes

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokentree_proto::{Frame, FrameHeader, ProtocolError};

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    magic: MagicBytes,
    version: VersionByte,
    opcode: u8,
    payload_size: PayloadSize,
    body: Vec<u8>,
}

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne,
    AllZeros,
    Random(u16),
}

#[derive(Debug, Clone, Arbitrary)]
enum VersionByte {
    Valid,
    Zero,
    Random(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMax,
    JustOverMax,
    Max,
}

impl BoundaryFrame {
    fn magic(&self) -> u16 {
        match self.magic {
            MagicBytes::Valid => FrameHeader::MAGIC,
            MagicBytes::OffByOne => FrameHeader::MAGIC.wrapping_add(1),
            MagicBytes::AllZeros => 0,
            MagicBytes::Random(magic) => magic,
        }
    }

    fn version(&self) -> u8 {
        match self.version {
            VersionByte::Valid => FrameHeader::VERSION,
            VersionByte::Zero => 0,
            VersionByte::Random(version) => version,
        }
    }

    fn payload_size(&self) -> u32 {
        match self.payload_size {
            PayloadSize::Zero => 0,
            PayloadSize::Small(size) => u32::from(size),
            PayloadSize::AtMax => FrameHeader::MAX_PAYLOAD_SIZE,
            PayloadSize::JustOverMax => FrameHeader::MAX_PAYLOAD_SIZE + 1,
            PayloadSize::Max => u32::MAX,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FrameHeader::SIZE + self.body.len());
        bytes.extend_from_slice(&self.magic().to_be_bytes());
        bytes.push(self.version());
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.payload_size().to_be_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fuzz_target!(|input: BoundaryFrame| {
    let bytes = input.to_bytes();
    let size = input.payload_size();

    match Frame::decode(&bytes) {
        Ok((frame, consumed)) => {
            assert_eq!(input.magic(), FrameHeader::MAGIC);
            assert_eq!(input.version(), FrameHeader::VERSION);
            assert!(size <= FrameHeader::MAX_PAYLOAD_SIZE);
            assert_eq!(consumed, FrameHeader::SIZE + size as usize);
            assert_eq!(frame.payload.len(), size as usize);
            assert_eq!(frame.header.opcode(), input.opcode);
        },
        Err(ProtocolError::InvalidMagic(magic)) => {
            assert_ne!(magic, FrameHeader::MAGIC);
        },
        Err(ProtocolError::UnsupportedVersion(version)) => {
            assert_eq!(input.magic(), FrameHeader::MAGIC);
            assert_ne!(version, FrameHeader::VERSION);
        },
        Err(ProtocolError::PayloadTooLarge { .. }) => {
            assert!(size > FrameHeader::MAX_PAYLOAD_SIZE);
        },
        Err(err @ ProtocolError::FrameTooShort { .. }) => {
            assert!(err.is_incomplete());
            assert!(input.body.len() < size as usize);
        },
        Err(err) => panic!("unexpected header error: {err}"),
    }
});
