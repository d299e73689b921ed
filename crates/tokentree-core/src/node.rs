//! Node protocol state machine.
//!
//! One [`Node`] per tree vertex. Inputs are driver commands, peer messages and
//! timers; each is handled to completion and produces a list of
//! [`NodeAction`]s (sends, delayed self-deliveries, history records) in the
//! order they happened. The node never performs I/O itself.
//!
//! # Algorithm
//!
//! Every node keeps a `holder` pointer to the neighbour it believes leads to
//! the token (or to itself when it has the token), a FIFO of pending requests,
//! and an `asked` flag for its single outstanding upstream request. After each
//! state change two steps restore the local invariant:
//!
//! - assign privilege: a node holding an unused token hands it to the head of
//!   its queue (itself, entering the critical section, or a neighbour)
//! - make request: a node without the token and with pending requests asks
//!   its holder once
//!
//! # Lifecycle
//!
//! ```text
//! ┌────────┐  Fail   ┌────────┐  StartRecovery  ┌────────────┐
//! │ Normal │────────>│ Failed │────────────────>│ Recovering │
//! └────────┘         └────────┘                 └────────────┘
//!      ^                                              │
//!      └──────────────── last Advise ─────────────────┘
//! ```
//!
//! Outside `Normal`, `Request`, `Privilege` and `PrivilegeAndRequest` still
//! update the queue and holder, but the token is neither handed on nor
//! requested until recovery completes. Whatever was accepted while `Failed`
//! is discarded by the recovery reset and rebuilt from the neighbour census.

use std::time::Duration;

use tokentree_proto::{
    Advise, Command, CommandKind, Envelope, NodeId, PeerMessage, TimerMessage,
};

use crate::{
    config::NodeConfig,
    error::{NodeError, Rejection},
    history::HistoryEvent,
    queue::RequestQueue,
    recovery::{CensusOutcome, RecoveryCensus},
};

/// Input delivered to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInput {
    /// Driver command
    Command(Command),
    /// Message from a neighbour
    Peer(Envelope),
    /// Previously scheduled self-delivery
    Timer(TimerMessage),
}

/// Effect requested by a node, executed by the driver in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    /// Deliver this envelope to `envelope.to`
    Send(Envelope),
    /// Deliver `timer` back to this node after `after`
    Schedule {
        /// Delay before delivery
        after: Duration,
        /// Timer to deliver
        timer: TimerMessage,
    },
    /// Append to this node's history
    Record(HistoryEvent),
}

/// Crash lifecycle of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Serving requests
    Normal,
    /// Crashed, waiting for the `StartRecovery` timer
    Failed,
    /// Collecting `Advise` replies from neighbours
    Recovering(RecoveryCensus),
}

/// Protocol state of one node.
///
/// # Invariants
///
/// - `asked` implies `holder` is a neighbour, never the node itself
/// - `using` implies `holder` is the node itself
/// - the request queue holds distinct ids
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    neighbours: Vec<NodeId>,
    neighbours_assigned: bool,
    holder: Option<NodeId>,
    queue: RequestQueue,
    using: bool,
    asked: bool,
    mode: Mode,
}

impl Node {
    /// Fresh node: no neighbours, no holder, empty queue.
    #[must_use]
    pub fn new(id: NodeId, config: NodeConfig) -> Self {
        Self {
            id,
            config,
            neighbours: Vec::new(),
            neighbours_assigned: false,
            holder: None,
            queue: RequestQueue::new(),
            using: false,
            asked: false,
            mode: Mode::Normal,
        }
    }

    /// Node identifier.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Configuration this node was built with.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Assigned neighbours, in assignment order.
    #[must_use]
    pub fn neighbours(&self) -> &[NodeId] {
        &self.neighbours
    }

    /// Current holder pointer. `None` until initialized.
    #[must_use]
    pub fn holder(&self) -> Option<NodeId> {
        self.holder
    }

    /// Pending requests.
    #[must_use]
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Whether the node occupies the critical section.
    #[must_use]
    pub fn is_using(&self) -> bool {
        self.using
    }

    /// Whether a request to the holder is outstanding.
    #[must_use]
    pub fn has_asked(&self) -> bool {
        self.asked
    }

    /// Whether this node believes it has the token.
    #[must_use]
    pub fn holds_token(&self) -> bool {
        self.holder == Some(self.id)
    }

    /// Whether the node has joined the token tree.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.holder.is_some()
    }

    /// Crash lifecycle state.
    #[must_use]
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Whether the node is crashed.
    #[must_use]
    pub fn in_failure_mode(&self) -> bool {
        matches!(self.mode, Mode::Failed)
    }

    /// Whether the node is running the recovery census.
    #[must_use]
    pub fn in_recovery_mode(&self) -> bool {
        matches!(self.mode, Mode::Recovering(_))
    }

    /// `Advise` replies collected in the current recovery, 0 otherwise.
    #[must_use]
    pub fn advise_count(&self) -> usize {
        match &self.mode {
            Mode::Recovering(census) => census.advise_count(),
            Mode::Normal | Mode::Failed => 0,
        }
    }

    /// Process one input.
    ///
    /// On error the node's state is unchanged and no action must be executed.
    pub fn handle(&mut self, input: NodeInput) -> Result<Vec<NodeAction>, NodeError> {
        let mut actions = Vec::new();
        match input {
            NodeInput::Command(command) => self.handle_command(command, &mut actions)?,
            NodeInput::Peer(envelope) => self.handle_peer(envelope, &mut actions)?,
            NodeInput::Timer(timer) => self.handle_timer(timer, &mut actions)?,
        }
        Ok(actions)
    }

    fn handle_command(
        &mut self,
        command: Command,
        actions: &mut Vec<NodeAction>,
    ) -> Result<(), NodeError> {
        match command {
            Command::AssignNeighbours(neighbours) => self.assign_neighbours(neighbours, actions),
            Command::DesignateRoot => self.designate_root(actions),
            Command::WantCs => self.want_cs(actions),
            Command::Fail => self.fail(actions),
        }
    }

    fn assign_neighbours(
        &mut self,
        neighbours: Vec<NodeId>,
        actions: &mut Vec<NodeAction>,
    ) -> Result<(), NodeError> {
        if self.neighbours_assigned {
            return Err(NodeError::NeighboursAlreadyAssigned);
        }
        if neighbours.contains(&self.id) {
            return Err(NodeError::InvalidNeighbourhood { reason: "node lists itself" });
        }
        for (i, id) in neighbours.iter().enumerate() {
            if neighbours[..i].contains(id) {
                return Err(NodeError::InvalidNeighbourhood { reason: "duplicate neighbour" });
            }
        }

        actions.push(NodeAction::Record(HistoryEvent::Neighbourhood(neighbours.clone())));
        self.neighbours = neighbours;
        self.neighbours_assigned = true;
        Ok(())
    }

    fn designate_root(&mut self, actions: &mut Vec<NodeAction>) -> Result<(), NodeError> {
        if !self.neighbours_assigned {
            return Err(NodeError::NotInitialized { operation: "DesignateRoot" });
        }
        if let Some(holder) = self.holder {
            return Err(NodeError::AlreadyInitialized { holder });
        }

        actions.push(NodeAction::Record(HistoryEvent::CommandReceived(CommandKind::DesignateRoot)));
        self.holder = Some(self.id);
        for &peer in &self.neighbours {
            Self::send(self.id, peer, PeerMessage::Initialize, actions);
        }
        self.rebalance(actions);
        Ok(())
    }

    fn want_cs(&mut self, actions: &mut Vec<NodeAction>) -> Result<(), NodeError> {
        if self.in_failure_mode() {
            return Err(NodeError::Rejected {
                command: CommandKind::WantCs,
                reason: Rejection::Failed,
            });
        }

        actions.push(NodeAction::Record(HistoryEvent::CommandReceived(CommandKind::WantCs)));
        self.enqueue(self.id, actions);
        self.rebalance(actions);
        Ok(())
    }

    fn fail(&mut self, actions: &mut Vec<NodeAction>) -> Result<(), NodeError> {
        let rejection = match self.mode {
            _ if !self.is_initialized() => Some(Rejection::Uninitialized),
            Mode::Failed => Some(Rejection::Failed),
            Mode::Recovering(_) => Some(Rejection::Recovering),
            Mode::Normal if self.using => Some(Rejection::InCriticalSection),
            Mode::Normal => None,
        };
        if let Some(reason) = rejection {
            return Err(NodeError::Rejected { command: CommandKind::Fail, reason });
        }

        actions.push(NodeAction::Record(HistoryEvent::CommandReceived(CommandKind::Fail)));
        self.mode = Mode::Failed;
        actions.push(NodeAction::Schedule {
            after: self.config.failure_duration,
            timer: TimerMessage::StartRecovery,
        });
        actions.push(NodeAction::Record(HistoryEvent::Failed));
        Ok(())
    }

    fn handle_peer(
        &mut self,
        envelope: Envelope,
        actions: &mut Vec<NodeAction>,
    ) -> Result<(), NodeError> {
        let Envelope { from, to, message } = envelope;
        if to != self.id {
            return Err(NodeError::Misrouted { node: self.id, to });
        }
        if !self.neighbours.contains(&from) {
            return Err(NodeError::UnknownNeighbour { from });
        }

        actions.push(NodeAction::Record(HistoryEvent::Received { kind: message.kind(), from }));

        match message {
            PeerMessage::Initialize => self.on_initialize(from, actions)?,
            PeerMessage::Request => {
                self.enqueue(from, actions);
                self.rebalance(actions);
            },
            PeerMessage::Privilege => {
                self.take_token();
                self.rebalance(actions);
            },
            PeerMessage::PrivilegeAndRequest => {
                self.take_token();
                self.enqueue(from, actions);
                self.rebalance(actions);
            },
            PeerMessage::Restart => {
                let advise = Advise {
                    you_are_my_holder: self.holder == Some(from),
                    asked: self.asked,
                    you_asked_me: self.queue.contains(from),
                };
                Self::send(self.id, from, PeerMessage::Advise(advise), actions);
            },
            PeerMessage::Advise(advise) => self.on_advise(from, advise, actions)?,
        }
        Ok(())
    }

    fn on_initialize(&mut self, from: NodeId, actions: &mut Vec<NodeAction>) -> Result<(), NodeError> {
        if let Some(holder) = self.holder {
            return Err(NodeError::AlreadyInitialized { holder });
        }

        self.holder = Some(from);
        for &peer in self.neighbours.iter().filter(|&&peer| peer != from) {
            Self::send(self.id, peer, PeerMessage::Initialize, actions);
        }
        self.rebalance(actions);
        Ok(())
    }

    fn on_advise(
        &mut self,
        from: NodeId,
        advise: Advise,
        actions: &mut Vec<NodeAction>,
    ) -> Result<(), NodeError> {
        let Mode::Recovering(census) = &mut self.mode else {
            return Err(NodeError::UnexpectedAdvise { from });
        };
        let outcome = census.record(from, advise)?;
        let complete = census.is_complete();

        match outcome {
            CensusOutcome::Enqueue(peer) => self.enqueue(peer, actions),
            CensusOutcome::AdoptHolder { holder, asked } => {
                self.holder = Some(holder);
                if asked {
                    self.asked = true;
                }
            },
            CensusOutcome::NoChange => {},
        }

        if complete {
            self.finish_recovery(actions);
        }
        Ok(())
    }

    fn handle_timer(
        &mut self,
        timer: TimerMessage,
        actions: &mut Vec<NodeAction>,
    ) -> Result<(), NodeError> {
        match timer {
            TimerMessage::ExitCs => {
                if !self.using {
                    return Err(NodeError::UnexpectedTimer { timer });
                }
                actions.push(NodeAction::Record(HistoryEvent::Received {
                    kind: timer.kind(),
                    from: self.id,
                }));
                self.using = false;
                actions.push(NodeAction::Record(HistoryEvent::ExitedCs));
                self.rebalance(actions);
            },
            TimerMessage::StartRecovery => {
                if !self.in_failure_mode() {
                    return Err(NodeError::UnexpectedTimer { timer });
                }
                actions.push(NodeAction::Record(HistoryEvent::Received {
                    kind: timer.kind(),
                    from: self.id,
                }));
                self.start_recovery(actions);
            },
        }
        Ok(())
    }

    /// Forget holder, queue and `asked`, then ask every neighbour for its view.
    fn start_recovery(&mut self, actions: &mut Vec<NodeAction>) {
        self.using = false;
        self.asked = false;
        self.holder = Some(self.id);
        if !self.queue.is_empty() {
            self.queue.clear();
            actions.push(NodeAction::Record(HistoryEvent::QueueContent(Vec::new())));
        }
        self.mode = Mode::Recovering(RecoveryCensus::new(self.neighbours.len()));
        actions.push(NodeAction::Record(HistoryEvent::EnteredRecovery));

        if self.neighbours.is_empty() {
            self.finish_recovery(actions);
            return;
        }
        for &peer in &self.neighbours {
            Self::send(self.id, peer, PeerMessage::Restart, actions);
        }
    }

    fn finish_recovery(&mut self, actions: &mut Vec<NodeAction>) {
        self.mode = Mode::Normal;
        actions.push(NodeAction::Record(HistoryEvent::ExitedRecovery));
        self.rebalance(actions);
    }

    /// Token arrived: any outstanding request has been answered.
    fn take_token(&mut self) {
        self.holder = Some(self.id);
        self.asked = false;
    }

    fn enqueue(&mut self, id: NodeId, actions: &mut Vec<NodeAction>) {
        if self.queue.enqueue(id) {
            actions.push(NodeAction::Record(HistoryEvent::QueueContent(self.queue.to_vec())));
        }
    }

    /// Assign privilege, then make request. Deferred outside `Normal`.
    fn rebalance(&mut self, actions: &mut Vec<NodeAction>) {
        if self.mode != Mode::Normal {
            return;
        }
        self.assign_privilege(actions);
        self.make_request(actions);
    }

    fn assign_privilege(&mut self, actions: &mut Vec<NodeAction>) {
        if !self.holds_token() || self.using {
            return;
        }
        let Some(next) = self.queue.pop_front() else {
            return;
        };
        actions.push(NodeAction::Record(HistoryEvent::QueueContent(self.queue.to_vec())));

        self.holder = Some(next);
        self.asked = false;

        if next == self.id {
            self.using = true;
            actions.push(NodeAction::Schedule {
                after: self.config.cs_duration,
                timer: TimerMessage::ExitCs,
            });
            actions.push(NodeAction::Record(HistoryEvent::EnteredCs));
        } else if self.config.combine_privilege_and_request && !self.queue.is_empty() {
            Self::send(self.id, next, PeerMessage::PrivilegeAndRequest, actions);
            self.asked = true;
        } else {
            Self::send(self.id, next, PeerMessage::Privilege, actions);
        }
    }

    fn make_request(&mut self, actions: &mut Vec<NodeAction>) {
        let Some(holder) = self.holder else {
            return;
        };
        if holder == self.id || self.queue.is_empty() || self.asked {
            return;
        }

        Self::send(self.id, holder, PeerMessage::Request, actions);
        self.asked = true;
    }

    fn send(from: NodeId, to: NodeId, message: PeerMessage, actions: &mut Vec<NodeAction>) {
        actions.push(NodeAction::Send(Envelope::new(from, to, message)));
        actions.push(NodeAction::Record(HistoryEvent::Sent { kind: message.kind(), to }));
    }
}
