//! Operations for model-based testing.
//!
//! Operations are generated randomly (by proptest or a fuzzer) and applied to
//! a [`Simulator`]. They are kept inside the protocol's failure model: a crash
//! is only injected while every node is serving requests, so at most one node
//! is ever down or recovering.

use std::time::Duration;

use arbitrary::Arbitrary;
use tokentree_core::Mode;
use tokentree_proto::NodeId;

use crate::simulator::{SimError, Simulator};

/// Node index before clamping to the simulation size.
pub type ModelNodeId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Node asks for the critical section.
    RequestCs {
        /// Target node (taken modulo the node count)
        node: ModelNodeId,
    },

    /// Node crashes, if the failure model allows it right now.
    Fail {
        /// Target node (taken modulo the node count)
        node: ModelNodeId,
    },

    /// Advance simulation time, processing everything due.
    Advance {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// What an operation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// `WantCS` injected
    Requested(NodeId),
    /// `Fail` injected and accepted
    Failed(NodeId),
    /// Crash skipped to stay inside the failure model
    FailSkipped(NodeId),
    /// Clock advanced
    Advanced(Duration),
}

impl Operation {
    /// Apply to `sim`.
    pub fn apply(self, sim: &mut Simulator) -> Result<Applied, SimError> {
        match self {
            Self::RequestCs { node } => {
                let id = clamp(sim, node);
                sim.request_cs(id)?;
                Ok(Applied::Requested(id))
            },
            Self::Fail { node } => {
                let id = clamp(sim, node);
                // Settle commands already injected at this instant
                sim.run_until(sim.now())?;
                if !can_fail(sim, id) {
                    return Ok(Applied::FailSkipped(id));
                }
                sim.fail(id)?;
                // Take effect now so the next operation sees the outage
                sim.run_until(sim.now())?;
                Ok(Applied::Failed(id))
            },
            Self::Advance { millis } => {
                let duration = Duration::from_millis(u64::from(millis));
                sim.run_for(duration)?;
                Ok(Applied::Advanced(duration))
            },
        }
    }
}

fn clamp(sim: &Simulator, node: ModelNodeId) -> NodeId {
    let nodes = u32::try_from(sim.topology().len()).unwrap_or(u32::MAX).max(1);
    NodeId(u32::from(node) % nodes)
}

/// Target is initialized, idle outside the critical section, and nobody is
/// down or recovering.
fn can_fail(sim: &Simulator, id: NodeId) -> bool {
    let Some(target) = sim.node(id) else {
        return false;
    };
    let all_normal = sim
        .topology()
        .node_ids()
        .filter_map(|other| sim.node(other))
        .all(|node| *node.mode() == Mode::Normal);

    all_normal && target.is_initialized() && !target.is_using()
}
