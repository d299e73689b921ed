//! Per-node history log.
//!
//! Every observable protocol step is recorded as a [`HistoryEvent`]. The
//! rendered lines are a stable external format: log-based tests and the
//! `PrintHistory` command depend on them verbatim, e.g.
//!
//! ```text
//! Node 03 received Request msg from node 07
//! Node 03 sent Privilege msg to node 07
//! Queue content of node 03: [1, 3]
//! ```

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tokentree_proto::{CommandKind, MessageKind, NodeId};

use crate::error::Rejection;

/// One observable step of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// Node constructed at bootstrap
    Created {
        /// Reserved greedy flag from the configuration
        greedy: bool,
    },
    /// Neighbours assigned
    Neighbourhood(Vec<NodeId>),
    /// Driver command accepted
    CommandReceived(CommandKind),
    /// Driver command refused
    CommandRejected {
        /// Refused command
        command: CommandKind,
        /// Why it was refused
        reason: Rejection,
    },
    /// Peer message or timer handled
    Received {
        /// Message name
        kind: MessageKind,
        /// Sender (the node itself for timers)
        from: NodeId,
    },
    /// Peer message sent
    Sent {
        /// Message name
        kind: MessageKind,
        /// Recipient
        to: NodeId,
    },
    /// Critical section entered
    EnteredCs,
    /// Critical section left
    ExitedCs,
    /// Request queue after a change, oldest first
    QueueContent(Vec<NodeId>),
    /// Node crashed
    Failed,
    /// Recovery census started
    EnteredRecovery,
    /// Recovery census complete
    ExitedRecovery,
    /// Input the algorithm could not explain
    ProtocolViolation(String),
}

impl HistoryEvent {
    /// Render as a history line for `node`.
    #[must_use]
    pub fn line(&self, node: NodeId) -> String {
        Line { node, event: self }.to_string()
    }
}

struct Line<'a> {
    node: NodeId,
    event: &'a HistoryEvent,
}

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node;
        match self.event {
            HistoryEvent::Created { greedy } => write!(f, "Node {node} created, greedy: {greedy}"),
            HistoryEvent::Neighbourhood(ids) => {
                write!(f, "Node {node} neighbourhood: ")?;
                write_ids(f, ids)
            },
            HistoryEvent::CommandReceived(command) => {
                write!(f, "Node {node} received {command} command")
            },
            HistoryEvent::CommandRejected { command, reason } => {
                write!(f, "Node {node} rejected {command} command: {reason}")
            },
            HistoryEvent::Received { kind, from } => {
                write!(f, "Node {node} received {kind} msg from node {from}")
            },
            HistoryEvent::Sent { kind, to } => write!(f, "Node {node} sent {kind} msg to node {to}"),
            HistoryEvent::EnteredCs => write!(f, "Node {node} entered CS"),
            HistoryEvent::ExitedCs => write!(f, "Node {node} exited CS"),
            HistoryEvent::QueueContent(ids) => {
                write!(f, "Queue content of node {node}: ")?;
                write_ids(f, ids)
            },
            HistoryEvent::Failed => write!(f, "Node {node} failed"),
            HistoryEvent::EnteredRecovery => write!(f, "Node {node} entered recovery mode"),
            HistoryEvent::ExitedRecovery => write!(f, "Node {node} exited recovery mode"),
            HistoryEvent::ProtocolViolation(reason) => {
                write!(f, "Node {node} protocol violation: {reason}")
            },
        }
    }
}

/// `[1, 7, 8]`, ids unpadded.
fn write_ids(f: &mut fmt::Formatter<'_>, ids: &[NodeId]) -> fmt::Result {
    f.write_str("[")?;
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", id.as_u32())?;
    }
    f.write_str("]")
}

/// A recorded event with its node and time offset from cluster start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Node that recorded the event
    pub node: NodeId,
    /// Offset from cluster start
    pub at: Duration,
    /// What happened
    pub event: HistoryEvent,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Line { node: self.node, event: &self.event }, f)
    }
}

/// Append-only history of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    node: NodeId,
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Empty history for `node`.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self { node, entries: Vec::new() }
    }

    /// Node this history belongs to.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Append an event observed `at` the given offset.
    pub fn record(&mut self, at: Duration, event: HistoryEvent) -> &HistoryEntry {
        debug_assert!(self.entries.last().is_none_or(|last| last.at <= at), "history went back in time");
        let index = self.entries.len();
        self.entries.push(HistoryEntry { node: self.node, at, event });
        &self.entries[index]
    }

    /// Entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Rendered lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    /// Printable block for `PrintHistory`: each line prefixed with the id.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("{}: {entry}\n", self.node));
        }
        out
    }

    /// Number of entries matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&HistoryEvent) -> bool) -> usize {
        self.entries.iter().filter(|entry| predicate(&entry.event)).count()
    }

    /// Index of the first entry at or after `from` matching `predicate`.
    pub fn position_from(
        &self,
        from: usize,
        predicate: impl Fn(&HistoryEvent) -> bool,
    ) -> Option<usize> {
        self.entries.iter().skip(from).position(|entry| predicate(&entry.event)).map(|i| i + from)
    }

    /// Interleave several histories into one system-wide timeline.
    ///
    /// Ordered by time offset. Entries with equal offsets keep the order of
    /// `histories`, then their per-node order.
    #[must_use]
    pub fn merge(histories: &[History]) -> Vec<HistoryEntry> {
        let mut timeline: Vec<HistoryEntry> =
            histories.iter().flat_map(|history| history.entries.iter().cloned()).collect();
        timeline.sort_by_key(|entry| entry.at);
        timeline
    }
}
