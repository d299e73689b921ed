//! Messages exchanged over networked transports.
//!
//! Only the inner value of each variant is serialized; the frame opcode
//! identifies which variant the payload belongs to.

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Command, Envelope, Frame, FrameHeader, NodeId,
    errors::{ProtocolError, Result},
};

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Node-to-node protocol message
    Peer = 0x01,
    /// Driver command for the receiving node
    Control = 0x02,
    /// Ask the receiving node for its history
    HistoryRequest = 0x03,
    /// History of one node
    HistoryReply = 0x04,
}

impl Opcode {
    /// Wire value.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value. `None` if unassigned.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Peer),
            0x02 => Some(Self::Control),
            0x03 => Some(Self::HistoryRequest),
            0x04 => Some(Self::HistoryReply),
            _ => None,
        }
    }
}

/// Rendered history of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReply {
    /// Node the history belongs to
    pub node: NodeId,
    /// History lines, oldest first
    pub lines: Vec<String>,
}

/// Everything a networked node sends or receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// Protocol traffic between nodes
    Peer(Envelope),
    /// Driver command
    Control(Command),
    /// History dump request (empty payload)
    HistoryRequest,
    /// History dump response
    HistoryReply(HistoryReply),
}

impl WireMessage {
    /// Opcode for this message.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Peer(_) => Opcode::Peer,
            Self::Control(_) => Opcode::Control,
            Self::HistoryRequest => Opcode::HistoryRequest,
            Self::HistoryReply(_) => Opcode::HistoryReply,
        }
    }

    /// Serialize the inner value as CBOR into `dst`.
    pub fn encode_payload(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Peer(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Control(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HistoryRequest => Ok(()),
            Self::HistoryReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Encode into a complete frame.
    pub fn into_frame(self) -> Result<Frame> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)?;
        Ok(Frame::new(self.opcode().to_u8(), payload))
    }

    /// Decode the payload of `frame` according to its opcode.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = Opcode::from_u8(frame.header.opcode())
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        Self::decode_payload(opcode, &frame.payload)
    }

    /// Decode a payload given its opcode.
    pub fn decode_payload(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let message = match opcode {
            Opcode::Peer => Self::Peer(cbor(bytes)?),
            Opcode::Control => Self::Control(cbor(bytes)?),
            Opcode::HistoryRequest => Self::HistoryRequest,
            Opcode::HistoryReply => Self::HistoryReply(cbor(bytes)?),
        };

        Ok(message)
    }
}

fn cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
