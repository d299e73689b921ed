//! Node identifiers, protocol messages and driver commands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node in the token tree.
///
/// Rendered with two zero-padded digits (`03`), which is the format every
/// history line uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Raw value as an index into per-node tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Census reply describing the responder's view of a recovering node.
///
/// The three flags are independent facts taken from the responder's local
/// state at the moment it handled the `Restart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Advise {
    /// The responder's holder pointer designates the recovering node
    pub you_are_my_holder: bool,
    /// The responder has an outstanding request towards its own holder
    pub asked: bool,
    /// The recovering node is waiting in the responder's request queue
    pub you_asked_me: bool,
}

/// Node-to-node protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Orientation flood from the designated root
    Initialize,
    /// Ask the recipient to forward the token eventually
    Request,
    /// Token transfer
    Privilege,
    /// Token transfer bundled with the sender's own pending request
    PrivilegeAndRequest,
    /// Recovery probe from a restarted node
    Restart,
    /// Reply to [`PeerMessage::Restart`]
    Advise(Advise),
}

impl PeerMessage {
    /// Kind of this message, as named in history lines.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Initialize => MessageKind::Initialize,
            Self::Request => MessageKind::Request,
            Self::Privilege => MessageKind::Privilege,
            Self::PrivilegeAndRequest => MessageKind::PrivilegeAndRequest,
            Self::Restart => MessageKind::Restart,
            Self::Advise(_) => MessageKind::Advise,
        }
    }

    /// Whether this message moves the token to the recipient.
    #[must_use]
    pub const fn carries_token(&self) -> bool {
        matches!(self, Self::Privilege | Self::PrivilegeAndRequest)
    }
}

/// A peer message with explicit sender and recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending node
    pub from: NodeId,
    /// Receiving node
    pub to: NodeId,
    /// Message body
    pub message: PeerMessage,
}

impl Envelope {
    /// Address `message` from `from` to `to`.
    #[must_use]
    pub const fn new(from: NodeId, to: NodeId, message: PeerMessage) -> Self {
        Self { from, to, message }
    }
}

/// Delayed message a node schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerMessage {
    /// End of critical section occupancy
    ExitCs,
    /// End of failure mode, start of the recovery census
    StartRecovery,
}

impl TimerMessage {
    /// Kind of this timer, as named in history lines.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::ExitCs => MessageKind::ExitCs,
            Self::StartRecovery => MessageKind::StartRecovery,
        }
    }
}

/// Driver command injected into a single node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// One-time neighbour assignment, before any protocol traffic
    AssignNeighbours(Vec<NodeId>),
    /// Make this node the initial token holder and flood `Initialize`
    DesignateRoot,
    /// Request the critical section
    WantCs,
    /// Crash this node for the configured failure duration
    Fail,
}

impl Command {
    /// Kind of this command, as named in history lines.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::AssignNeighbours(_) => CommandKind::AssignNeighbours,
            Self::DesignateRoot => CommandKind::DesignateRoot,
            Self::WantCs => CommandKind::WantCs,
            Self::Fail => CommandKind::Fail,
        }
    }
}

/// Message and timer names used in history lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// `Initialize`
    Initialize,
    /// `Request`
    Request,
    /// `Privilege`
    Privilege,
    /// `PrivilegeAndRequest`
    PrivilegeAndRequest,
    /// `Restart`
    Restart,
    /// `Advise`
    Advise,
    /// `ExitCS` timer
    ExitCs,
    /// `StartRecovery` timer
    StartRecovery,
}

impl MessageKind {
    /// Name as printed in history lines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::Request => "Request",
            Self::Privilege => "Privilege",
            Self::PrivilegeAndRequest => "PrivilegeAndRequest",
            Self::Restart => "Restart",
            Self::Advise => "Advise",
            Self::ExitCs => "ExitCS",
            Self::StartRecovery => "StartRecovery",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command names used in history lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// `AssignNeighbours`
    AssignNeighbours,
    /// `DesignateRoot`
    DesignateRoot,
    /// `WantCS`
    WantCs,
    /// `Fail`
    Fail,
}

impl CommandKind {
    /// Name as printed in history lines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AssignNeighbours => "AssignNeighbours",
            Self::DesignateRoot => "DesignateRoot",
            Self::WantCs => "WantCS",
            Self::Fail => "Fail",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
