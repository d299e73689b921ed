//! Error types for the protocol core.
//!
//! Two categories with different consequences:
//!
//! - Protocol violations: a peer or timer delivered something the algorithm
//!   cannot explain. These indicate a bug or a broken collaborator and are
//!   surfaced as test failures.
//! - Rejected commands: the driver asked for something the node's current
//!   state does not allow (e.g. `Fail` while in the critical section). The
//!   command is a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokentree_proto::{CommandKind, NodeId, TimerMessage};

/// Why a driver command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rejection {
    /// Node occupies the critical section
    InCriticalSection,
    /// Node is in failure mode
    Failed,
    /// Node is running the recovery census
    Recovering,
    /// Node has not joined the token tree yet
    Uninitialized,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InCriticalSection => "node is in the critical section",
            Self::Failed => "node is in failure mode",
            Self::Recovering => "node is in recovery mode",
            Self::Uninitialized => "node is not initialized",
        })
    }
}

/// Errors returned by [`crate::Node::handle`].
///
/// A handler that returns an error has not changed the node's state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Second `AssignNeighbours` command
    #[error("neighbours already assigned")]
    NeighboursAlreadyAssigned,

    /// Neighbour list names the node itself or repeats an id
    #[error("invalid neighbourhood: {reason}")]
    InvalidNeighbourhood {
        /// What is wrong with the list
        reason: &'static str,
    },

    /// Operation requires neighbours to be assigned first
    #[error("node not initialized: cannot handle {operation}")]
    NotInitialized {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Second `Initialize` or `DesignateRoot`
    #[error("node already initialized with holder {holder}")]
    AlreadyInitialized {
        /// Holder set by the first initialization
        holder: NodeId,
    },

    /// Peer message from a node that is not a neighbour
    #[error("message from {from} which is not a neighbour")]
    UnknownNeighbour {
        /// Claimed sender
        from: NodeId,
    },

    /// Envelope addressed to another node
    #[error("message addressed to {to} delivered to {node}")]
    Misrouted {
        /// Node that received it
        node: NodeId,
        /// Intended recipient
        to: NodeId,
    },

    /// `Advise` outside a recovery census, or more replies than neighbours
    #[error("unexpected Advise from {from}")]
    UnexpectedAdvise {
        /// Sender of the reply
        from: NodeId,
    },

    /// Second `Advise` from the same neighbour in one census
    #[error("duplicate Advise from {from}")]
    DuplicateAdvise {
        /// Sender of the reply
        from: NodeId,
    },

    /// Timer fired in a state where it cannot have been scheduled
    #[error("unexpected {timer:?} timer")]
    UnexpectedTimer {
        /// Timer that fired
        timer: TimerMessage,
    },

    /// Driver command refused in the current state
    #[error("{command} command rejected: {reason}")]
    Rejected {
        /// Refused command
        command: CommandKind,
        /// Why it was refused
        reason: Rejection,
    },
}

impl NodeError {
    /// Returns true if this error means the algorithm's assumptions were
    /// broken, as opposed to a driver command being refused.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Errors building a [`crate::Topology`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// No nodes
    #[error("topology has no nodes")]
    Empty,

    /// More nodes than two-digit ids can name
    #[error("{nodes} nodes exceed the limit of {max}")]
    TooLarge {
        /// Requested node count
        nodes: u32,
        /// Largest supported node count
        max: u32,
    },

    /// Tree fan-out of zero
    #[error("fan-out must be at least 1")]
    InvalidFanout,

    /// Edge endpoint outside `0..nodes`
    #[error("edge references node {node} outside 0..{nodes}")]
    UnknownNode {
        /// Offending id
        node: u32,
        /// Number of nodes
        nodes: u32,
    },

    /// Edge from a node to itself
    #[error("self loop on node {0}")]
    SelfLoop(u32),

    /// Same undirected edge listed twice
    #[error("duplicate edge {0}-{1}")]
    DuplicateEdge(u32, u32),

    /// Some node cannot be reached from node 0
    #[error("node {0} is not connected to the tree")]
    Disconnected(u32),

    /// More edges than a tree over the node set can have
    #[error("edges form a cycle")]
    Cyclic,
}
