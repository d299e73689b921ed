//! Node inboxes and the transport abstraction.
//!
//! Every node task drains one unbounded inbox. Peers, timers and the driver
//! all write into it, so a node handles exactly one input at a time and
//! messages from one sender arrive in the order they were sent.

use std::{collections::HashMap, sync::Arc};

use tokentree_core::History;
use tokentree_proto::{Command, Envelope, NodeId, TimerMessage};
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;

/// Everything a node task can receive.
#[derive(Debug)]
pub enum Inbound {
    /// Protocol message from a neighbour
    Peer(Envelope),
    /// Delayed self-delivery
    Timer(TimerMessage),
    /// Driver command
    Command(Command),
    /// Reply with a copy of the node's history
    DumpHistory(oneshot::Sender<History>),
    /// Stop the task and return the history
    Shutdown,
}

/// Sending half of a node inbox.
pub type Mailbox = mpsc::UnboundedSender<Inbound>;

/// Receiving half of a node inbox.
pub type Inbox = mpsc::UnboundedReceiver<Inbound>;

/// Delivers envelopes to their recipients.
///
/// Implementations must preserve per-sender order towards each recipient.
pub trait Transport: Send + Sync + 'static {
    /// Queue `envelope` for delivery to `envelope.to`.
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// In-process transport: a read-only route table of node inboxes.
///
/// Built once at bootstrap, before any task starts, and shared by every node.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    routes: Arc<HashMap<NodeId, Mailbox>>,
}

impl ChannelTransport {
    /// Transport over the given route table.
    #[must_use]
    pub fn new(routes: HashMap<NodeId, Mailbox>) -> Self {
        Self { routes: Arc::new(routes) }
    }

    /// Inbox of `id`, if routed.
    #[must_use]
    pub fn mailbox(&self, id: NodeId) -> Option<&Mailbox> {
        self.routes.get(&id)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let mailbox =
            self.routes.get(&envelope.to).ok_or(TransportError::UnknownPeer(envelope.to))?;
        mailbox.send(Inbound::Peer(envelope)).map_err(|_| TransportError::Closed(envelope.to))
    }
}

#[cfg(test)]
mod tests {
    use tokentree_proto::PeerMessage;

    use super::*;

    #[test]
    fn routes_by_recipient() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(HashMap::from([(NodeId(1), tx)]));

        let envelope = Envelope::new(NodeId(0), NodeId(1), PeerMessage::Request);
        transport.send(envelope).unwrap();

        assert!(matches!(rx.try_recv(), Ok(Inbound::Peer(e)) if e == envelope));
    }

    #[test]
    fn unknown_and_closed_recipients_fail() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(HashMap::from([(NodeId(1), tx)]));

        let stray = Envelope::new(NodeId(0), NodeId(7), PeerMessage::Request);
        assert_eq!(transport.send(stray), Err(TransportError::UnknownPeer(NodeId(7))));

        drop(rx);
        let closed = Envelope::new(NodeId(0), NodeId(1), PeerMessage::Request);
        assert_eq!(transport.send(closed), Err(TransportError::Closed(NodeId(1))));
    }
}
