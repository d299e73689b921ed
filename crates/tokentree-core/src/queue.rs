//! Request queue.

use std::collections::VecDeque;

use tokentree_proto::NodeId;

/// FIFO of nodes waiting for the token, in arrival order.
///
/// # Invariants
///
/// - No id appears twice. [`RequestQueue::enqueue`] is idempotent, so a
///   request learnt twice (once from a `Request`, once from a census `Advise`)
///   is still served once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQueue {
    entries: VecDeque<NodeId>,
}

impl RequestQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless already queued. Returns whether it was added.
    pub fn enqueue(&mut self, id: NodeId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.entries.push_back(id);
        true
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<NodeId> {
        self.entries.pop_front()
    }

    /// Whether `id` is queued.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains(&id)
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().copied()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot of the entries, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.entries.iter().copied().collect()
    }
}
