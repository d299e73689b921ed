//! Scheduled events for the discrete-event simulator.

use std::{cmp::Ordering, time::Duration};

use tokentree_proto::{Command, Envelope, NodeId, TimerMessage};

/// Something that happens to one node at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A peer message reaches its recipient
    Deliver(Envelope),
    /// A node's delayed self-delivery fires
    Timer {
        /// Node that scheduled the timer
        node: NodeId,
        /// Timer message
        timer: TimerMessage,
    },
    /// The driver injects a command
    Command {
        /// Target node
        node: NodeId,
        /// Injected command
        command: Command,
    },
}

impl Event {
    /// Node that handles this event.
    #[must_use]
    pub fn target(&self) -> NodeId {
        match self {
            Self::Deliver(envelope) => envelope.to,
            Self::Timer { node, .. } | Self::Command { node, .. } => *node,
        }
    }
}

/// An event with its firing time and a tie-breaking sequence number.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// Offset from simulation start
    pub at: Duration,
    /// Insertion order, unique per simulator
    pub seq: u64,
    /// What happens
    pub event: Event,
}

// BinaryHeap is a max-heap: earliest time, then lowest sequence, pops first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn timer(at_ms: u64, seq: u64) -> ScheduledEvent {
        ScheduledEvent {
            at: Duration::from_millis(at_ms),
            seq,
            event: Event::Timer { node: NodeId(0), timer: TimerMessage::ExitCs },
        }
    }

    #[test]
    fn earliest_then_oldest_pops_first() {
        let mut heap = BinaryHeap::from([timer(10, 1), timer(5, 2), timer(10, 0), timer(5, 3)]);

        let order: Vec<(u128, u64)> =
            std::iter::from_fn(|| heap.pop()).map(|e| (e.at.as_millis(), e.seq)).collect();

        assert_eq!(order, vec![(5, 2), (5, 3), (10, 0), (10, 1)]);
    }
}
