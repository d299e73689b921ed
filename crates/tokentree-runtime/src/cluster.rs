//! Driver handle over a running cluster of node tasks.
//!
//! Bootstrap order matters: every inbox exists and the route table is frozen
//! before any task starts, and every node has its neighbours queued before the
//! root is designated. Inbox FIFO order then guarantees that no protocol
//! message overtakes the neighbour assignment.

use std::collections::HashMap;

use tokentree_core::{Environment, History, Node, NodeConfig, Topology};
use tokentree_proto::{Command, NodeId};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::RuntimeError,
    system_env::SystemEnv,
    task::NodeTask,
    transport::{ChannelTransport, Inbound, Mailbox},
};

/// Cluster shape and per-node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Number of nodes
    pub nodes: u32,
    /// Tree fan-out (2 = binary tree)
    pub fanout: u32,
    /// Initial token holder
    pub root: NodeId,
    /// Configuration shared by every node
    pub node: NodeConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { nodes: 10, fanout: 2, root: NodeId(0), node: NodeConfig::default() }
    }
}

/// Running cluster: one tokio task per node.
pub struct Cluster {
    topology: Topology,
    root: NodeId,
    mailboxes: Vec<Mailbox>,
    handles: Vec<JoinHandle<History>>,
}

impl Cluster {
    /// Build the topology, spawn every node task and assign neighbours.
    ///
    /// The root is not designated yet; call [`Cluster::designate_root`].
    pub fn spawn(config: &ClusterConfig) -> Result<Self, RuntimeError> {
        let topology = Topology::tree(config.nodes, config.fanout)?;
        if !topology.contains(config.root) {
            return Err(RuntimeError::InvalidRoot { root: config.root, nodes: topology.len() });
        }

        let env = SystemEnv::new();
        let epoch = env.now();

        let (mailboxes, inboxes): (Vec<_>, Vec<_>) =
            topology.node_ids().map(|_| mpsc::unbounded_channel::<Inbound>()).unzip();
        let routes: HashMap<NodeId, Mailbox> = topology.node_ids().zip(mailboxes.iter().cloned()).collect();
        let transport = ChannelTransport::new(routes);

        let mut handles = Vec::with_capacity(topology.len());
        for ((id, mailbox), inbox) in topology.node_ids().zip(mailboxes.iter().cloned()).zip(inboxes) {
            let node = Node::new(id, config.node.clone());
            let task = NodeTask::new(node, transport.clone(), env, epoch, mailbox, inbox);
            handles.push(tokio::spawn(task.run()));
        }

        for (id, mailbox) in topology.node_ids().zip(&mailboxes) {
            let neighbours = topology.neighbours(id).to_vec();
            mailbox
                .send(Inbound::Command(Command::AssignNeighbours(neighbours)))
                .map_err(|_| RuntimeError::NodeStopped(id))?;
        }

        tracing::info!(nodes = topology.len(), fanout = config.fanout, "cluster started");
        Ok(Self { topology, root: config.root, mailboxes, handles })
    }

    /// Node ids in the cluster.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.node_ids()
    }

    /// Static neighbour map.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Configured initial token holder.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Make `id` the initial token holder and start the `Initialize` flood.
    pub fn designate_root(&self, id: NodeId) -> Result<(), RuntimeError> {
        self.command(id, Command::DesignateRoot)
    }

    /// Ask `id` to enter the critical section.
    pub fn request_cs(&self, id: NodeId) -> Result<(), RuntimeError> {
        self.command(id, Command::WantCs)
    }

    /// Crash `id` for the configured failure duration.
    ///
    /// Refused by the node (and recorded in its history) while it is in the
    /// critical section or not yet recovered from a previous failure.
    pub fn fail(&self, id: NodeId) -> Result<(), RuntimeError> {
        self.command(id, Command::Fail)
    }

    /// Copy of the history of `id`.
    pub async fn dump_history(&self, id: NodeId) -> Result<History, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.mailbox(id)?.send(Inbound::DumpHistory(reply)).map_err(|_| RuntimeError::NodeStopped(id))?;
        response.await.map_err(|_| RuntimeError::NodeStopped(id))
    }

    /// Copies of every node's history, in id order.
    pub async fn dump_all_histories(&self) -> Result<Vec<History>, RuntimeError> {
        let mut histories = Vec::with_capacity(self.mailboxes.len());
        for id in self.topology.node_ids() {
            histories.push(self.dump_history(id).await?);
        }
        Ok(histories)
    }

    /// Stop every node task and collect final histories, in id order.
    pub async fn shutdown(self) -> Result<Vec<History>, RuntimeError> {
        for mailbox in &self.mailboxes {
            // Already stopped tasks are reported by their join handle
            let _ = mailbox.send(Inbound::Shutdown);
        }

        let mut histories = Vec::with_capacity(self.handles.len());
        for (id, handle) in self.topology.node_ids().zip(self.handles) {
            histories.push(handle.await.map_err(|_| RuntimeError::NodeStopped(id))?);
        }

        tracing::info!("cluster stopped");
        Ok(histories)
    }

    fn command(&self, id: NodeId, command: Command) -> Result<(), RuntimeError> {
        tracing::debug!(node = %id, command = %command.kind(), "driver command");
        self.mailbox(id)?.send(Inbound::Command(command)).map_err(|_| RuntimeError::NodeStopped(id))
    }

    fn mailbox(&self, id: NodeId) -> Result<&Mailbox, RuntimeError> {
        self.mailboxes
            .get(id.index())
            .ok_or(RuntimeError::UnknownNode { node: id, nodes: self.mailboxes.len() })
    }
}
