//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture every node's protocol state plus the messages still in
//! flight at one instant. Invariants operate on snapshots rather than live
//! state so a check sees one consistent cut of the system.

use std::time::Duration;

use serde::Serialize;
use tokentree_core::{Mode, Node};
use tokentree_proto::{Envelope, NodeId};

/// Snapshot of the entire system.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    /// Offset from simulation start
    pub at: Duration,
    /// Per-node state, in id order
    pub nodes: Vec<NodeSnapshot>,
    /// Peer messages sent but not yet delivered
    pub in_flight: Vec<Envelope>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no nodes).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot built from node states.
    #[must_use]
    pub fn from_nodes(at: Duration, nodes: Vec<NodeSnapshot>, in_flight: Vec<Envelope>) -> Self {
        Self { at, nodes, in_flight }
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(id.index())
    }

    /// Privilege messages not yet delivered.
    #[must_use]
    pub fn tokens_in_flight(&self) -> usize {
        self.in_flight.iter().filter(|envelope| envelope.message.carries_token()).count()
    }

    /// No message in flight and every node serving requests.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.is_empty() && self.nodes.iter().all(|node| node.mode == ModeSnapshot::Normal)
    }
}

/// Crash lifecycle without the census internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ModeSnapshot {
    /// Serving requests
    #[default]
    Normal,
    /// Down
    Failed,
    /// Waiting for `Advise` replies
    Recovering,
}

impl From<&Mode> for ModeSnapshot {
    fn from(mode: &Mode) -> Self {
        match mode {
            Mode::Normal => Self::Normal,
            Mode::Failed => Self::Failed,
            Mode::Recovering(_) => Self::Recovering,
        }
    }
}

/// Snapshot of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    /// Node identifier
    pub id: NodeId,
    /// Neighbour set
    pub neighbours: Vec<NodeId>,
    /// Holder pointer, `None` before initialization
    pub holder: Option<NodeId>,
    /// Inside the critical section
    pub using: bool,
    /// Request outstanding towards the holder
    pub asked: bool,
    /// Pending requests, oldest first
    pub queue: Vec<NodeId>,
    /// Crash lifecycle
    pub mode: ModeSnapshot,
    /// Accepted `Fail` commands so far
    pub crashes: u32,
    /// `asked` was set by the recovery census for a request the crash
    /// forgot, and the token has not arrived since
    pub census_ask: bool,
}

impl NodeSnapshot {
    /// Capture `node`.
    #[must_use]
    pub fn capture(node: &Node, crashes: u32) -> Self {
        Self {
            id: node.id(),
            neighbours: node.neighbours().to_vec(),
            holder: node.holder(),
            using: node.is_using(),
            asked: node.has_asked(),
            queue: node.queue().to_vec(),
            mode: node.mode().into(),
            crashes,
            census_ask: false,
        }
    }

    /// Mark an outstanding request left behind by the recovery census.
    #[must_use]
    pub fn with_census_ask(mut self, census_ask: bool) -> Self {
        self.census_ask = census_ask;
        self
    }

    /// Points at itself while outside recovery.
    ///
    /// A recovering node points at itself until the census says otherwise,
    /// which does not mean it holds the token.
    #[must_use]
    pub fn claims_token(&self) -> bool {
        self.holder == Some(self.id) && self.mode != ModeSnapshot::Recovering
    }
}
