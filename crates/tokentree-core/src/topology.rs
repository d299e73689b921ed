//! Static neighbour maps.
//!
//! A topology is built once at bootstrap and only read afterwards. Node ids
//! are dense (`0..len`). Every builder produces a tree: connected and acyclic,
//! which the token orientation relies on.

use std::collections::{HashSet, VecDeque};

use tokentree_proto::NodeId;

use crate::error::TopologyError;

/// Undirected tree over nodes `0..len`, as per-node neighbour lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    neighbours: Vec<Vec<NodeId>>,
}

impl Topology {
    /// Largest supported cluster. History lines print ids as two digits.
    pub const MAX_NODES: u32 = 100;

    /// Complete `fanout`-ary tree in breadth-first numbering.
    ///
    /// Each node lists its parent `(i - 1) / fanout` first, then its children
    /// `i * fanout + 1 ..= i * fanout + fanout` that exist.
    pub fn tree(nodes: u32, fanout: u32) -> Result<Self, TopologyError> {
        check_size(nodes)?;
        if fanout == 0 {
            return Err(TopologyError::InvalidFanout);
        }

        let neighbours = (0..nodes)
            .map(|i| {
                let parent = (i > 0).then(|| NodeId((i - 1) / fanout));
                let first_child = u64::from(i) * u64::from(fanout) + 1;
                let children = (first_child..first_child + u64::from(fanout))
                    .take_while(|&child| child < u64::from(nodes))
                    .map(|child| NodeId(child as u32));
                parent.into_iter().chain(children).collect::<Vec<_>>()
            })
            .collect();

        Ok(Self { neighbours })
    }

    /// Binary tree: node `i` is adjacent to `(i - 1) / 2`, `2i + 1` and
    /// `2i + 2`.
    pub fn binary_tree(nodes: u32) -> Result<Self, TopologyError> {
        Self::tree(nodes, 2)
    }

    /// Path `0 - 1 - ... - (nodes - 1)`.
    pub fn chain(nodes: u32) -> Result<Self, TopologyError> {
        Self::tree(nodes, 1)
    }

    /// Node 0 adjacent to every other node.
    pub fn star(nodes: u32) -> Result<Self, TopologyError> {
        let edges: Vec<(u32, u32)> = (1..nodes).map(|i| (0, i)).collect();
        Self::from_edges(nodes, &edges)
    }

    /// Tree from an explicit undirected edge list.
    ///
    /// Neighbour order follows the order edges are listed in. Rejects
    /// anything that is not a spanning tree over `0..nodes`.
    pub fn from_edges(nodes: u32, edges: &[(u32, u32)]) -> Result<Self, TopologyError> {
        check_size(nodes)?;

        let mut seen = HashSet::with_capacity(edges.len());
        let mut neighbours = vec![Vec::new(); nodes as usize];

        for &(a, b) in edges {
            for node in [a, b] {
                if node >= nodes {
                    return Err(TopologyError::UnknownNode { node, nodes });
                }
            }
            if a == b {
                return Err(TopologyError::SelfLoop(a));
            }
            if !seen.insert((a.min(b), a.max(b))) {
                return Err(TopologyError::DuplicateEdge(a, b));
            }

            neighbours[a as usize].push(NodeId(b));
            neighbours[b as usize].push(NodeId(a));
        }

        if edges.len() >= nodes as usize {
            return Err(TopologyError::Cyclic);
        }

        let topology = Self { neighbours };
        if let Some(unreached) = topology.first_unreachable() {
            return Err(TopologyError::Disconnected(unreached.as_u32()));
        }

        Ok(topology)
    }

    /// Neighbours of `id`, empty for unknown ids.
    #[must_use]
    pub fn neighbours(&self, id: NodeId) -> &[NodeId] {
        self.neighbours.get(id.index()).map(Vec::as_slice).unwrap_or_default()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.neighbours.len()).map(|i| NodeId(i as u32))
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    /// Whether the topology has no nodes. Builders never produce one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    /// Whether `id` names a node of this topology.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.neighbours.len()
    }

    /// Hops from `from` to `to` along tree edges.
    #[must_use]
    pub fn distance(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.bfs(from).get(to.index()).copied().flatten()
    }

    fn first_unreachable(&self) -> Option<NodeId> {
        self.bfs(NodeId(0)).iter().position(Option::is_none).map(|i| NodeId(i as u32))
    }

    fn bfs(&self, start: NodeId) -> Vec<Option<usize>> {
        let mut depth = vec![None; self.neighbours.len()];
        if !self.contains(start) {
            return depth;
        }

        let mut frontier = VecDeque::from([start]);
        depth[start.index()] = Some(0);
        while let Some(node) = frontier.pop_front() {
            let next = depth[node.index()].map_or(0, |d| d + 1);
            for &peer in self.neighbours(node) {
                if depth[peer.index()].is_none() {
                    depth[peer.index()] = Some(next);
                    frontier.push_back(peer);
                }
            }
        }
        depth
    }
}

fn check_size(nodes: u32) -> Result<(), TopologyError> {
    match nodes {
        0 => Err(TopologyError::Empty),
        n if n > Topology::MAX_NODES => Err(TopologyError::TooLarge { nodes, max: Topology::MAX_NODES }),
        _ => Ok(()),
    }
}
