//! Runtime error types.

use thiserror::Error;
use tokentree_core::TopologyError;
use tokentree_proto::NodeId;

/// Errors delivering an envelope to its recipient.
///
/// The protocol assumes reliable delivery, so drivers only log these; they
/// surface during shutdown when recipients have already stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the recipient
    #[error("no route to node {0}")]
    UnknownPeer(NodeId),

    /// Recipient's inbox is closed
    #[error("node {0} is no longer receiving")]
    Closed(NodeId),
}

/// Errors from the [`crate::Cluster`] driver handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Node id outside the cluster
    #[error("unknown node {node} (cluster has {nodes} nodes)")]
    UnknownNode {
        /// Requested id
        node: NodeId,
        /// Cluster size
        nodes: usize,
    },

    /// Node task has exited
    #[error("node {0} has stopped")]
    NodeStopped(NodeId),

    /// Cluster configuration does not describe a tree
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    /// Root outside the cluster
    #[error("root {root} outside 0..{nodes}")]
    InvalidRoot {
        /// Configured root
        root: NodeId,
        /// Cluster size
        nodes: usize,
    },
}
