//! Per-node dispatch loop.
//!
//! A [`NodeTask`] owns one [`Node`] and its [`History`] and is the only code
//! that touches them. It drains the node's inbox one input at a time and
//! executes the resulting actions:
//!
//! - `Send`: hand the envelope to the transport
//! - `Schedule`: spawn a sleeper that posts the timer back into the inbox
//! - `Record`: append to the history (mirrored to `tracing` at debug)
//!
//! Timers are never cancelled; the algorithm relies on every scheduled timer
//! firing exactly once.

use tokentree_core::{Environment, History, HistoryEvent, Node, NodeAction, NodeError, NodeInput};
use tokentree_proto::NodeId;

use crate::transport::{Inbound, Inbox, Mailbox, Transport};

/// Actor wrapping one protocol node.
pub struct NodeTask<T, E>
where
    T: Transport,
    E: Environment,
{
    node: Node,
    history: History,
    transport: T,
    env: E,
    epoch: E::Instant,
    mailbox: Mailbox,
    inbox: Inbox,
}

impl<T, E> NodeTask<T, E>
where
    T: Transport,
    E: Environment,
{
    /// Wrap `node`. `epoch` is the shared cluster start used to stamp history
    /// entries; `mailbox` must be the sending half of `inbox`.
    pub fn new(
        node: Node,
        transport: T,
        env: E,
        epoch: E::Instant,
        mailbox: Mailbox,
        inbox: Inbox,
    ) -> Self {
        let mut task = Self {
            history: History::new(node.id()),
            node,
            transport,
            env,
            epoch,
            mailbox,
            inbox,
        };
        let greedy = task.node.config().greedy;
        task.record(HistoryEvent::Created { greedy });
        task
    }

    /// Identifier of the wrapped node.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Drain the inbox until `Shutdown`. Returns the node's history.
    pub async fn run(mut self) -> History {
        while let Some(inbound) = self.inbox.recv().await {
            match inbound {
                Inbound::Peer(envelope) => {
                    tracing::trace!(node = %self.id(), from = %envelope.from, kind = %envelope.message.kind(), "deliver");
                    self.handle(NodeInput::Peer(envelope));
                },
                Inbound::Timer(timer) => self.handle(NodeInput::Timer(timer)),
                Inbound::Command(command) => self.handle(NodeInput::Command(command)),
                Inbound::DumpHistory(reply) => {
                    // Requester may have given up
                    let _ = reply.send(self.history.clone());
                },
                Inbound::Shutdown => break,
            }
        }

        tracing::debug!(node = %self.id(), entries = self.history.entries().len(), "node task stopped");
        self.history
    }

    /// Feed one input to the node and execute its actions.
    pub fn handle(&mut self, input: NodeInput) {
        match self.node.handle(input) {
            Ok(actions) => self.execute(actions),
            Err(NodeError::Rejected { command, reason }) => {
                tracing::warn!(node = %self.id(), %command, %reason, "command rejected");
                self.record(HistoryEvent::CommandRejected { command, reason });
            },
            Err(err) => {
                tracing::error!(node = %self.id(), error = %err, "protocol violation");
                self.record(HistoryEvent::ProtocolViolation(err.to_string()));
            },
        }
    }

    fn execute(&mut self, actions: Vec<NodeAction>) {
        for action in actions {
            match action {
                NodeAction::Send(envelope) => {
                    if let Err(err) = self.transport.send(envelope) {
                        tracing::error!(node = %self.id(), to = %envelope.to, error = %err, "send failed");
                    }
                },
                NodeAction::Schedule { after, timer } => {
                    let env = self.env.clone();
                    let mailbox = self.mailbox.clone();
                    tokio::spawn(async move {
                        env.sleep(after).await;
                        // Inbox closes only at shutdown
                        let _ = mailbox.send(Inbound::Timer(timer));
                    });
                },
                NodeAction::Record(event) => self.record(event),
            }
        }
    }

    fn record(&mut self, event: HistoryEvent) {
        let at = self.env.elapsed_since(self.epoch);
        let entry = self.history.record(at, event);
        tracing::debug!(at = ?entry.at, "{entry}");
    }
}
