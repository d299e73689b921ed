//! Deterministic discrete-event simulator.
//!
//! Drives every [`Node`] directly, without tasks or channels: messages,
//! timers and driver commands are [`Event`]s in one binary heap ordered by
//! `(time, sequence)`. Link latency is drawn from a seeded `ChaCha8Rng`, so a
//! seed fully determines the run.
//!
//! Delivery on each ordered pair is FIFO: a message never overtakes an
//! earlier one on the same link, whatever latency it drew.

use std::{
    collections::{BinaryHeap, HashMap},
    time::Duration,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokentree_core::{
    History, HistoryEvent, Node, NodeAction, NodeConfig, NodeError, NodeInput, Rejection,
    Topology, TopologyError,
};
use tokentree_proto::{Command, CommandKind, Envelope, NodeId};

use crate::{
    event::{Event, ScheduledEvent},
    invariants::{InvariantRegistry, NodeSnapshot, SystemSnapshot, Violation},
};

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Number of nodes
    pub nodes: u32,
    /// Tree fan-out (2 = binary tree)
    pub fanout: u32,
    /// Configuration shared by every node
    pub node: NodeConfig,
    /// RNG seed for link latency
    pub seed: u64,
    /// Smallest link latency
    pub min_latency: Duration,
    /// Largest link latency
    pub max_latency: Duration,
    /// Events processed by one `run_until_quiescent` call before giving up
    pub event_budget: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            fanout: 2,
            node: NodeConfig::default(),
            seed: 0,
            min_latency: Duration::from_millis(1),
            max_latency: Duration::from_millis(20),
            event_budget: 1_000_000,
        }
    }
}

/// Simulation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Configuration does not describe a tree
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    /// Node id outside the simulation
    #[error("unknown node {node} (simulation has {nodes} nodes)")]
    UnknownNode {
        /// Requested id
        node: NodeId,
        /// Simulation size
        nodes: usize,
    },

    /// A node reported an input it could not explain
    #[error("node {node} at {at:?}: {source}")]
    Protocol {
        /// Reporting node
        node: NodeId,
        /// Simulation time
        at: Duration,
        /// What the node reported
        source: NodeError,
    },

    /// An attached invariant failed
    #[error("invariant violated at {at:?}: {violations:?}")]
    Invariant {
        /// Simulation time
        at: Duration,
        /// Every failed invariant
        violations: Vec<Violation>,
    },

    /// Event queue never drained
    #[error("still busy after {0} events")]
    BudgetExhausted(usize),
}

/// A driver command a node refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedCommand {
    /// Simulation time
    pub at: Duration,
    /// Refusing node
    pub node: NodeId,
    /// Refused command
    pub command: CommandKind,
    /// Why
    pub reason: Rejection,
}

/// Discrete-event simulator over a static tree.
pub struct Simulator {
    config: SimConfig,
    topology: Topology,
    nodes: Vec<Node>,
    histories: Vec<History>,
    crashes: Vec<u32>,
    /// Per node: `asked` came out of a recovery census with nothing queued
    census_asks: Vec<bool>,
    now: Duration,
    queue: BinaryHeap<ScheduledEvent>,
    next_seq: u64,
    rng: ChaCha8Rng,
    /// Latest scheduled delivery per `(from, to)`
    links: HashMap<(NodeId, NodeId), Duration>,
    rejections: Vec<RejectedCommand>,
    invariants: Option<InvariantRegistry>,
}

impl Simulator {
    /// Build the tree and assign every node its neighbours.
    ///
    /// No root is designated yet; call [`Simulator::designate_root`].
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let topology = Topology::tree(config.nodes, config.fanout)?;
        let nodes: Vec<Node> =
            topology.node_ids().map(|id| Node::new(id, config.node.clone())).collect();
        let histories = topology.node_ids().map(History::new).collect();

        let mut sim = Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            crashes: vec![0; nodes.len()],
            census_asks: vec![false; nodes.len()],
            config,
            nodes,
            histories,
            now: Duration::ZERO,
            queue: BinaryHeap::new(),
            next_seq: 0,
            links: HashMap::new(),
            rejections: Vec::new(),
            invariants: None,
            topology,
        };

        for id in sim.topology.node_ids().collect::<Vec<_>>() {
            let greedy = sim.config.node.greedy;
            sim.record(id, HistoryEvent::Created { greedy });
            let neighbours = sim.topology.neighbours(id).to_vec();
            sim.apply(id, NodeInput::Command(Command::AssignNeighbours(neighbours)))?;
        }

        tracing::debug!(nodes = sim.nodes.len(), seed = sim.config.seed, "simulator ready");
        Ok(sim)
    }

    /// Check `registry` after every processed event.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Static neighbour map.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Simulation parameters.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Live node state.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// History of `id`.
    #[must_use]
    pub fn history(&self, id: NodeId) -> Option<&History> {
        self.histories.get(id.index())
    }

    /// Every history, in id order.
    #[must_use]
    pub fn histories(&self) -> &[History] {
        &self.histories
    }

    /// Commands refused so far, oldest first.
    #[must_use]
    pub fn rejections(&self) -> &[RejectedCommand] {
        &self.rejections
    }

    /// Accepted `Fail` commands for `id`.
    #[must_use]
    pub fn crashes(&self, id: NodeId) -> u32 {
        self.crashes.get(id.index()).copied().unwrap_or_default()
    }

    /// Outstanding request re-issued by a census with nothing queued behind
    /// it.
    #[must_use]
    pub fn has_census_ask(&self, id: NodeId) -> bool {
        self.census_asks.get(id.index()).copied().unwrap_or_default()
    }

    /// Undelivered peer messages, in no particular order.
    #[must_use]
    pub fn in_flight(&self) -> Vec<Envelope> {
        self.snapshot().in_flight
    }

    /// No message in flight and every node serving requests.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.snapshot().is_quiescent()
    }

    /// Events still scheduled.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Make `id` the initial token holder, now.
    pub fn designate_root(&mut self, id: NodeId) -> Result<(), SimError> {
        self.schedule_command(self.now, id, Command::DesignateRoot)
    }

    /// Ask `id` to enter the critical section, now.
    pub fn request_cs(&mut self, id: NodeId) -> Result<(), SimError> {
        self.schedule_command(self.now, id, Command::WantCs)
    }

    /// Crash `id`, now.
    pub fn fail(&mut self, id: NodeId) -> Result<(), SimError> {
        self.schedule_command(self.now, id, Command::Fail)
    }

    /// Inject `command` into `id` at `at` (clamped to the present).
    pub fn schedule_command(
        &mut self,
        at: Duration,
        id: NodeId,
        command: Command,
    ) -> Result<(), SimError> {
        self.check_node(id)?;
        self.schedule(at.max(self.now), Event::Command { node: id, command });
        Ok(())
    }

    /// Process the next event. Returns `false` when nothing is scheduled.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(scheduled) = self.queue.pop() else {
            return Ok(false);
        };
        self.now = self.now.max(scheduled.at);

        let target = scheduled.event.target();
        let input = match scheduled.event {
            Event::Deliver(envelope) => NodeInput::Peer(envelope),
            Event::Timer { timer, .. } => NodeInput::Timer(timer),
            Event::Command { command, .. } => NodeInput::Command(command),
        };
        self.apply(target, input)?;

        if let Some(registry) = &self.invariants {
            registry
                .check_all(&self.snapshot())
                .map_err(|violations| SimError::Invariant { at: self.now, violations })?;
        }
        Ok(true)
    }

    /// Process every event scheduled up to `deadline`, then move the clock
    /// there.
    pub fn run_until(&mut self, deadline: Duration) -> Result<(), SimError> {
        while self.queue.peek().is_some_and(|next| next.at <= deadline) {
            self.step()?;
        }
        self.now = self.now.max(deadline);
        Ok(())
    }

    /// Run for `duration` of simulated time.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), SimError> {
        self.run_until(self.now + duration)
    }

    /// Run until no message, timer or command is left.
    pub fn run_until_quiescent(&mut self) -> Result<(), SimError> {
        for _ in 0..self.config.event_budget {
            if !self.step()? {
                return Ok(());
            }
        }
        if self.queue.is_empty() {
            Ok(())
        } else {
            Err(SimError::BudgetExhausted(self.config.event_budget))
        }
    }

    /// Consistent cut of every node plus the messages in flight.
    #[must_use]
    pub fn snapshot(&self) -> SystemSnapshot {
        let nodes = self
            .nodes
            .iter()
            .zip(&self.crashes)
            .zip(&self.census_asks)
            .map(|((node, crashes), census_ask)| {
                NodeSnapshot::capture(node, *crashes).with_census_ask(*census_ask)
            })
            .collect();
        let in_flight = self
            .queue
            .iter()
            .filter_map(|scheduled| match scheduled.event {
                Event::Deliver(envelope) => Some(envelope),
                Event::Timer { .. } | Event::Command { .. } => None,
            })
            .collect();
        SystemSnapshot::from_nodes(self.now, nodes, in_flight)
    }

    fn check_node(&self, id: NodeId) -> Result<(), SimError> {
        if self.topology.contains(id) {
            Ok(())
        } else {
            Err(SimError::UnknownNode { node: id, nodes: self.nodes.len() })
        }
    }

    fn schedule(&mut self, at: Duration, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledEvent { at, seq, event });
    }

    fn apply(&mut self, id: NodeId, input: NodeInput) -> Result<(), SimError> {
        self.check_node(id)?;
        let failing = matches!(input, NodeInput::Command(Command::Fail));
        let was_recovering = self.nodes[id.index()].in_recovery_mode();

        match self.nodes[id.index()].handle(input) {
            Ok(actions) => {
                if failing {
                    self.crashes[id.index()] += 1;
                }
                self.track_census_ask(id, was_recovering);
                for action in actions {
                    self.execute(id, action);
                }
                Ok(())
            },
            Err(NodeError::Rejected { command, reason }) => {
                tracing::debug!(node = %id, %command, %reason, "command rejected");
                self.rejections.push(RejectedCommand { at: self.now, node: id, command, reason });
                self.record(id, HistoryEvent::CommandRejected { command, reason });
                Ok(())
            },
            Err(source) => {
                tracing::error!(node = %id, error = %source, "protocol violation");
                self.record(id, HistoryEvent::ProtocolViolation(source.to_string()));
                Err(SimError::Protocol { node: id, at: self.now, source })
            },
        }
    }

    /// A census may re-issue a request whose originator the crash forgot.
    /// That `asked` stands without a queue until the token next arrives.
    fn track_census_ask(&mut self, id: NodeId, was_recovering: bool) {
        let node = &self.nodes[id.index()];
        let flag = &mut self.census_asks[id.index()];
        if !node.has_asked() {
            *flag = false;
        } else if was_recovering && !node.in_recovery_mode() && node.queue().is_empty() {
            *flag = true;
        }
    }

    fn execute(&mut self, id: NodeId, action: NodeAction) {
        match action {
            NodeAction::Send(envelope) => {
                let latency = self.latency();
                let link = self.links.entry((envelope.from, envelope.to)).or_default();
                let at = (self.now + latency).max(*link);
                *link = at;
                self.schedule(at, Event::Deliver(envelope));
            },
            NodeAction::Schedule { after, timer } => {
                self.schedule(self.now + after, Event::Timer { node: id, timer });
            },
            NodeAction::Record(event) => self.record(id, event),
        }
    }

    fn latency(&mut self) -> Duration {
        let min = self.config.min_latency;
        let max = self.config.max_latency.max(min);
        let span = max - min;
        let nanos = u64::try_from(span.as_nanos()).unwrap_or(u64::MAX);
        min + Duration::from_nanos(self.rng.gen_range(0..=nanos))
    }

    fn record(&mut self, id: NodeId, event: HistoryEvent) {
        let entry = self.histories[id.index()].record(self.now, event);
        tracing::trace!(at = ?entry.at, "{entry}");
    }
}
