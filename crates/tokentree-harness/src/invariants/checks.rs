//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, ModeSnapshot, SystemSnapshot};

/// At most one node is inside the critical section.
pub struct MutualExclusion;

impl Invariant for MutualExclusion {
    fn name(&self) -> &'static str {
        "MutualExclusion"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let inside: Vec<_> =
            state.nodes.iter().filter(|node| node.using).map(|node| node.id).collect();

        if inside.len() > 1 {
            return Err(self.violation(format!("nodes {inside:?} are in the critical section")));
        }
        Ok(())
    }
}

/// A node never queues the same id twice.
pub struct UniqueQueueEntries;

impl Invariant for UniqueQueueEntries {
    fn name(&self) -> &'static str {
        "UniqueQueueEntries"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for node in &state.nodes {
            let mut seen = HashSet::new();
            if let Some(duplicate) = node.queue.iter().find(|id| !seen.insert(**id)) {
                return Err(self.violation(format!(
                    "node {} queues {duplicate} twice: {:?}",
                    node.id, node.queue
                )));
            }
        }
        Ok(())
    }
}

/// `asked` agrees with the holder pointer and the queue.
///
/// For every node serving requests:
/// - an outstanding request means the token is elsewhere
/// - an outstanding request means someone is waiting, unless the recovery
///   census re-issued a request the crash forgot and the token has not
///   arrived since
pub struct AskedConsistency;

impl Invariant for AskedConsistency {
    fn name(&self) -> &'static str {
        "AskedConsistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for node in state.nodes.iter().filter(|node| node.mode == ModeSnapshot::Normal) {
            if !node.asked {
                continue;
            }
            if node.holder.is_none_or(|holder| holder == node.id) {
                return Err(self.violation(format!(
                    "node {} asked while holder is {:?}",
                    node.id, node.holder
                )));
            }
            if !node.census_ask && node.queue.is_empty() {
                return Err(self.violation(format!("node {} asked with an empty queue", node.id)));
            }
        }
        Ok(())
    }
}

/// At most one token exists, held or in flight.
///
/// Recovering nodes point at themselves until the census completes and are
/// not counted.
pub struct SingleTokenHolder;

impl Invariant for SingleTokenHolder {
    fn name(&self) -> &'static str {
        "SingleTokenHolder"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let holders: Vec<_> =
            state.nodes.iter().filter(|node| node.claims_token()).map(|node| node.id).collect();
        let in_flight = state.tokens_in_flight();

        if holders.len() + in_flight > 1 {
            return Err(self.violation(format!(
                "holders {holders:?} with {in_flight} privilege message(s) in flight"
            )));
        }
        Ok(())
    }
}

/// At rest, every holder pointer leads to the unique token holder.
///
/// Checked only when the system is quiescent and every node is initialized:
/// each node points at itself or at a neighbour, exactly one points at
/// itself, and following pointers from any node reaches it.
pub struct HolderOrientation;

impl Invariant for HolderOrientation {
    fn name(&self) -> &'static str {
        "HolderOrientation"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.nodes.is_empty()
            || !state.is_quiescent()
            || state.nodes.iter().any(|node| node.holder.is_none())
        {
            return Ok(());
        }

        let roots: Vec<_> =
            state.nodes.iter().filter(|node| node.claims_token()).map(|node| node.id).collect();
        let [root] = roots.as_slice() else {
            return Err(self.violation(format!("expected one token holder at rest, got {roots:?}")));
        };

        for node in &state.nodes {
            let mut current = node;
            for _ in 0..state.nodes.len() {
                let Some(holder) = current.holder else { break };
                if holder == current.id {
                    break;
                }
                if !current.neighbours.contains(&holder) {
                    return Err(self.violation(format!(
                        "node {} points at non-neighbour {holder}",
                        current.id
                    )));
                }
                let Some(next) = state.node(holder) else {
                    return Err(self.violation(format!(
                        "node {} points at unknown node {holder}",
                        current.id
                    )));
                };
                current = next;
            }

            if current.id != *root {
                return Err(self.violation(format!(
                    "pointers from node {} end at {} instead of holder {root}",
                    node.id, current.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokentree_proto::{Envelope, NodeId, PeerMessage};

    use super::*;
    use crate::invariants::NodeSnapshot;

    /// Chain 0 - 1 - 2 with the given holder pointers.
    fn chain(holders: [u32; 3]) -> Vec<NodeSnapshot> {
        let neighbours = [vec![NodeId(1)], vec![NodeId(0), NodeId(2)], vec![NodeId(1)]];
        neighbours
            .into_iter()
            .zip(holders)
            .enumerate()
            .map(|(i, (neighbours, holder))| NodeSnapshot {
                id: NodeId(u32::try_from(i).unwrap()),
                neighbours,
                holder: Some(NodeId(holder)),
                using: false,
                asked: false,
                queue: Vec::new(),
                mode: ModeSnapshot::Normal,
                crashes: 0,
                census_ask: false,
            })
            .collect()
    }

    fn at_rest(nodes: Vec<NodeSnapshot>) -> SystemSnapshot {
        SystemSnapshot::from_nodes(Duration::ZERO, nodes, Vec::new())
    }

    #[test]
    fn oriented_chain_passes() {
        let state = at_rest(chain([1, 1, 1]));
        for invariant in [&HolderOrientation as &dyn Invariant, &SingleTokenHolder] {
            assert!(invariant.check(&state).is_ok(), "{}", invariant.name());
        }
    }

    #[test]
    fn two_users_break_mutual_exclusion() {
        let mut nodes = chain([1, 1, 1]);
        nodes[0].using = true;
        nodes[2].using = true;

        let violation = MutualExclusion.check(&at_rest(nodes)).unwrap_err();
        assert_eq!(violation.invariant, "MutualExclusion");
    }

    #[test]
    fn duplicate_queue_entry_detected() {
        let mut nodes = chain([1, 1, 1]);
        nodes[1].queue = vec![NodeId(0), NodeId(2), NodeId(0)];

        assert!(UniqueQueueEntries.check(&at_rest(nodes)).is_err());
    }

    #[test]
    fn asked_at_holder_detected() {
        let mut nodes = chain([1, 1, 1]);
        nodes[1].asked = true;
        nodes[1].queue = vec![NodeId(0)];
        assert!(AskedConsistency.check(&at_rest(nodes)).is_err());

        let mut nodes = chain([1, 1, 1]);
        nodes[0].asked = true;
        assert!(AskedConsistency.check(&at_rest(nodes.clone())).is_err());

        // Crashing once is no lasting excuse
        nodes[0].crashes = 1;
        assert!(AskedConsistency.check(&at_rest(nodes.clone())).is_err());

        nodes[0].census_ask = true;
        assert!(AskedConsistency.check(&at_rest(nodes)).is_ok());
    }

    #[test]
    fn token_in_flight_counts() {
        let nodes = chain([1, 1, 1]);
        let in_flight = vec![Envelope::new(NodeId(1), NodeId(2), PeerMessage::Privilege)];
        let state = SystemSnapshot::from_nodes(Duration::ZERO, nodes, in_flight);

        assert!(SingleTokenHolder.check(&state).is_err());
        // Not at rest
        assert!(HolderOrientation.check(&state).is_ok());
    }

    #[test]
    fn recovering_self_pointer_is_not_a_token() {
        let mut nodes = chain([1, 1, 2]);
        nodes[2].mode = ModeSnapshot::Recovering;

        assert!(SingleTokenHolder.check(&at_rest(nodes)).is_ok());
    }

    #[test]
    fn cycle_detected_at_rest() {
        let state = at_rest(chain([1, 0, 1]));
        let violation = HolderOrientation.check(&state).unwrap_err();
        assert!(violation.message.contains("expected one token holder"));

        let state = at_rest(chain([1, 2, 2]));
        assert!(HolderOrientation.check(&state).is_ok());

        let state = at_rest(chain([0, 0, 2]));
        assert!(HolderOrientation.check(&state).is_err());
    }
}
