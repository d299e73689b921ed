//! Networked cluster under turmoil.
//!
//! Every node is a turmoil host named `node-<id>` running the production
//! [`NodeTask`] behind a TCP transport. Peers exchange [`Frame`]s over
//! simulated TCP, one stream per ordered pair, which keeps each link FIFO. A
//! [`ControlClient`] injects driver commands and fetches histories over the
//! same framing.
//!
//! Host software is spawned with `spawn_local`: turmoil drives each host on
//! its own local task set.

use std::{collections::HashMap, future::Future, io, sync::Arc, time::Duration};

use bytes::{Buf, BytesMut};
use tokentree_core::{Environment, Node, NodeConfig, Topology};
use tokentree_proto::{Command, Envelope, Frame, HistoryReply, NodeId, WireMessage};
use tokentree_runtime::{Inbound, Mailbox, NodeTask, SystemEnv, Transport, TransportError};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use turmoil::net::{TcpListener, TcpStream};

/// Port every node host listens on.
pub const PORT: u16 = 7400;

const LISTEN_ADDR: &str = "0.0.0.0:7400";

/// Connection attempts before a peer is considered unreachable.
const CONNECT_ATTEMPTS: u32 = 50;

const CONNECT_BACKOFF: Duration = Duration::from_millis(10);

/// Turmoil host name of `id`.
#[must_use]
pub fn host_name(id: NodeId) -> String {
    format!("node-{id}")
}

/// Read the next message, buffering partial frames in `buf`.
///
/// Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R, buf: &mut BytesMut) -> io::Result<Option<WireMessage>>
where
    R: AsyncRead + Unpin,
{
    loop {
        match Frame::decode(buf) {
            Ok((frame, consumed)) => {
                buf.advance(consumed);
                return Ok(Some(WireMessage::from_frame(&frame)?));
            },
            Err(err) if err.is_incomplete() => {},
            Err(err) => return Err(err.into()),
        }

        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(io::ErrorKind::UnexpectedEof.into()) };
        }
    }
}

/// Encode `message` as one frame and write it out.
pub async fn write_message<W>(writer: &mut W, message: WireMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.into_frame()?;
    let mut buf = BytesMut::new();
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await
}

async fn connect(peer: NodeId) -> io::Result<TcpStream> {
    let addr = format!("{}:{PORT}", host_name(peer));
    let mut last = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match TcpStream::connect(addr.as_str()).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                last = Some(err);
                tokio::time::sleep(CONNECT_BACKOFF).await;
            },
        }
    }
    Err(last.unwrap_or_else(|| io::ErrorKind::NotConnected.into()))
}

/// Transport writing framed envelopes to neighbour hosts.
///
/// One writer task per neighbour owns the outbound stream, so envelopes to a
/// peer leave in the order they were sent.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    links: Arc<HashMap<NodeId, mpsc::UnboundedSender<Envelope>>>,
}

impl TcpTransport {
    /// Start one writer task per neighbour. Connections open lazily.
    #[must_use]
    pub fn spawn(neighbours: &[NodeId]) -> Self {
        let links = neighbours
            .iter()
            .map(|&peer| {
                let (outbox, pending) = mpsc::unbounded_channel();
                tokio::task::spawn_local(pump(peer, pending, connect));
                (peer, outbox)
            })
            .collect();
        Self { links: Arc::new(links) }
    }
}

impl Transport for TcpTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let link = self.links.get(&envelope.to).ok_or(TransportError::UnknownPeer(envelope.to))?;
        link.send(envelope).map_err(|_| TransportError::Closed(envelope.to))
    }
}

/// Drain `pending` into `peer`, one envelope at a time.
///
/// Links are reliable FIFO: an envelope is held and retried over a fresh
/// connection until it is written, and nothing behind it leaves first.
async fn pump<S, F, Fut>(peer: NodeId, mut pending: mpsc::UnboundedReceiver<Envelope>, mut open: F)
where
    S: AsyncWrite + Unpin,
    F: FnMut(NodeId) -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    let mut stream: Option<S> = None;
    while let Some(envelope) = pending.recv().await {
        loop {
            if stream.is_none() {
                match open(peer).await {
                    Ok(conn) => stream = Some(conn),
                    Err(err) => {
                        tracing::warn!(to = %peer, error = %err, "peer unreachable, retrying");
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                        continue;
                    },
                }
            }
            let Some(conn) = stream.as_mut() else { continue };
            match write_message(conn, WireMessage::Peer(envelope)).await {
                Ok(()) => break,
                Err(err) => {
                    tracing::warn!(to = %peer, error = %err, "peer write failed, reconnecting");
                    stream = None;
                },
            }
        }
    }
}

/// Host software for node `id`: listen, run the node task until shutdown.
pub async fn run_node(id: NodeId, topology: Topology, config: NodeConfig) -> turmoil::Result {
    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    let neighbours = topology.neighbours(id).to_vec();

    let (mailbox, inbox) = mpsc::unbounded_channel();
    let env = SystemEnv::new();
    let transport = TcpTransport::spawn(&neighbours);
    let task = NodeTask::new(Node::new(id, config), transport, env, env.now(), mailbox.clone(), inbox);
    mailbox.send(Inbound::Command(Command::AssignNeighbours(neighbours)))?;

    tokio::task::spawn_local(accept_loop(listener, mailbox));

    let history = task.run().await;
    tracing::debug!(node = %id, entries = history.entries().len(), "host stopped");
    Ok(())
}

async fn accept_loop(listener: TcpListener, mailbox: Mailbox) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::task::spawn_local(serve(stream, mailbox.clone()));
            },
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                return;
            },
        }
    }
}

async fn serve(stream: TcpStream, mailbox: Mailbox) {
    if let Err(err) = serve_connection(stream, &mailbox).await {
        tracing::debug!(error = %err, "connection closed");
    }
}

async fn serve_connection(stream: TcpStream, mailbox: &Mailbox) -> io::Result<()> {
    let closed = || io::Error::from(io::ErrorKind::BrokenPipe);
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = BytesMut::new();

    while let Some(message) = read_message(&mut reader, &mut buf).await? {
        let inbound = match message {
            WireMessage::Peer(envelope) => Inbound::Peer(envelope),
            WireMessage::Control(command) => Inbound::Command(command),
            WireMessage::HistoryRequest => {
                let (reply, response) = oneshot::channel();
                mailbox.send(Inbound::DumpHistory(reply)).map_err(|_| closed())?;
                let history = response.await.map_err(|_| closed())?;
                let reply = HistoryReply { node: history.node(), lines: history.lines() };
                write_message(&mut writer, WireMessage::HistoryReply(reply)).await?;
                continue;
            },
            WireMessage::HistoryReply(reply) => {
                tracing::warn!(node = %reply.node, "unexpected history reply");
                continue;
            },
        };
        mailbox.send(inbound).map_err(|_| closed())?;
    }
    Ok(())
}

/// Driver connection to one node host.
pub struct ControlClient {
    node: NodeId,
    stream: TcpStream,
    buf: BytesMut,
}

impl ControlClient {
    /// Connect to `node`, retrying while its host starts.
    pub async fn connect(node: NodeId) -> io::Result<Self> {
        let stream = connect(node).await?;
        Ok(Self { node, stream, buf: BytesMut::new() })
    }

    /// Node this client drives.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Inject a driver command.
    pub async fn send(&mut self, command: Command) -> io::Result<()> {
        write_message(&mut self.stream, WireMessage::Control(command)).await
    }

    /// Fetch the node's rendered history.
    pub async fn history(&mut self) -> io::Result<HistoryReply> {
        write_message(&mut self.stream, WireMessage::HistoryRequest).await?;
        match read_message(&mut self.stream, &mut self.buf).await? {
            Some(WireMessage::HistoryReply(reply)) => Ok(reply),
            Some(other) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected history reply, got {:?}", other.opcode()),
            )),
            None => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }
}

/// Build a turmoil simulation with one host per node of `topology`.
#[must_use]
pub fn build(topology: &Topology, config: &NodeConfig, duration: Duration) -> turmoil::Sim<'static> {
    let mut sim = turmoil::Builder::new().simulation_duration(duration).build();
    for id in topology.node_ids() {
        let topology = topology.clone();
        let config = config.clone();
        sim.host(host_name(id), move || run_node(id, topology.clone(), config.clone()));
    }
    sim
}
