//! Recovery census.
//!
//! A restarted node has lost its holder pointer, request queue and `asked`
//! flag. It sends `Restart` to every neighbour and rebuilds those three fields
//! from the `Advise` replies, each of which describes how the neighbour sees
//! the restarted node:
//!
//! | `asked` | `you_are_my_holder` | Reconstruction step                       |
//! |---------|---------------------|-------------------------------------------|
//! | true    | true                | neighbour is waiting on us: enqueue it    |
//! | any     | false               | token is on the neighbour's side: holder  |
//! | false   | true                | nothing to rebuild                        |
//!
//! When the neighbour's side holds the token, `you_asked_me` tells whether our
//! pre-crash request is still queued there, i.e. whether we are still `asked`.

use tokentree_proto::{Advise, NodeId};

use crate::error::NodeError;

/// State rebuilt from one `Advise` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensusOutcome {
    /// The neighbour has an outstanding request routed through us
    Enqueue(NodeId),
    /// The token lies beyond this neighbour
    AdoptHolder {
        /// New holder pointer
        holder: NodeId,
        /// Our request is still queued at that neighbour
        asked: bool,
    },
    /// Neighbour points at us without waiting on us
    NoChange,
}

/// Progress of one recovery episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryCensus {
    expected: usize,
    responded: Vec<NodeId>,
}

impl RecoveryCensus {
    /// Census expecting one reply from each of `expected` neighbours.
    #[must_use]
    pub fn new(expected: usize) -> Self {
        Self { expected, responded: Vec::with_capacity(expected) }
    }

    /// Account for a reply from `from` and classify it.
    ///
    /// Fails without recording anything if `from` already replied or the
    /// census is already complete.
    pub fn record(&mut self, from: NodeId, advise: Advise) -> Result<CensusOutcome, NodeError> {
        if self.responded.contains(&from) {
            return Err(NodeError::DuplicateAdvise { from });
        }
        if self.is_complete() {
            return Err(NodeError::UnexpectedAdvise { from });
        }

        self.responded.push(from);

        let outcome = if advise.asked && advise.you_are_my_holder {
            CensusOutcome::Enqueue(from)
        } else if !advise.you_are_my_holder {
            CensusOutcome::AdoptHolder { holder: from, asked: advise.you_asked_me }
        } else {
            CensusOutcome::NoChange
        };

        Ok(outcome)
    }

    /// Replies received so far.
    #[must_use]
    pub fn advise_count(&self) -> usize {
        self.responded.len()
    }

    /// Replies still missing.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.responded.len())
    }

    /// Every neighbour has replied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.responded.len() >= self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advise(you_are_my_holder: bool, asked: bool, you_asked_me: bool) -> Advise {
        Advise { you_are_my_holder, asked, you_asked_me }
    }

    #[test]
    fn waiting_child_is_enqueued() {
        let mut census = RecoveryCensus::new(2);
        let outcome = census.record(NodeId(4), advise(true, true, false)).unwrap();
        assert_eq!(outcome, CensusOutcome::Enqueue(NodeId(4)));
    }

    #[test]
    fn neighbour_not_pointing_at_us_becomes_holder() {
        let mut census = RecoveryCensus::new(2);
        let outcome = census.record(NodeId(0), advise(false, true, true)).unwrap();
        assert_eq!(outcome, CensusOutcome::AdoptHolder { holder: NodeId(0), asked: true });
    }

    #[test]
    fn idle_child_changes_nothing() {
        let mut census = RecoveryCensus::new(1);
        assert_eq!(census.record(NodeId(2), advise(true, false, false)), Ok(CensusOutcome::NoChange));
        assert!(census.is_complete());
    }

    #[test]
    fn completes_after_every_neighbour() {
        let mut census = RecoveryCensus::new(3);
        for id in [1, 2] {
            census.record(NodeId(id), advise(true, false, false)).unwrap();
            assert!(!census.is_complete());
        }
        census.record(NodeId(3), advise(true, false, false)).unwrap();

        assert!(census.is_complete());
        assert_eq!(census.advise_count(), 3);
        assert_eq!(census.remaining(), 0);
    }

    #[test]
    fn reject_duplicate_reply() {
        let mut census = RecoveryCensus::new(2);
        census.record(NodeId(1), advise(true, false, false)).unwrap();

        let err = census.record(NodeId(1), advise(true, false, false)).unwrap_err();
        assert_eq!(err, NodeError::DuplicateAdvise { from: NodeId(1) });
        assert_eq!(census.advise_count(), 1);
    }

    #[test]
    fn reject_reply_beyond_neighbour_count() {
        let mut census = RecoveryCensus::new(1);
        census.record(NodeId(1), advise(true, false, false)).unwrap();

        let err = census.record(NodeId(2), advise(true, false, false)).unwrap_err();
        assert_eq!(err, NodeError::UnexpectedAdvise { from: NodeId(2) });
    }

    #[test]
    fn empty_census_is_complete_immediately() {
        assert!(RecoveryCensus::new(0).is_complete());
    }
}
