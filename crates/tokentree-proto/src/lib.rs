//! Tokentree protocol vocabulary.
//!
//! Everything that crosses a node boundary is defined here: node identifiers,
//! the peer-to-peer messages of the token tree algorithm, the delayed
//! self-messages a node schedules for itself, and the commands a driver injects
//! into a node.
//!
//! Messages are plain data. The in-process runtime moves them through channels
//! untouched; networked transports wrap them in a [`WireMessage`] and encode it
//! as a [`Frame`] (8-byte binary header followed by a CBOR payload).

mod errors;
mod frame;
mod message;
mod wire;

pub use errors::{ProtocolError, Result};
pub use frame::{Frame, FrameHeader};
pub use message::{
    Advise, Command, CommandKind, Envelope, MessageKind, NodeId, PeerMessage, TimerMessage,
};
pub use wire::{HistoryReply, Opcode, WireMessage};
