//! End-to-end trace of the smallest interesting tree.
//!
//! Two nodes, root 0, node 1 requests the critical section. Messages are
//! delivered FIFO by a minimal in-test loop; timers fire once the network is
//! idle. The full history of node 1 is pinned with an inline snapshot because
//! its line format is consumed by log-based tooling.

use std::collections::VecDeque;

use tokentree_core::{History, Node, NodeAction, NodeConfig, NodeInput};
use tokentree_proto::{Command, Envelope, NodeId, TimerMessage};

struct Pair {
    nodes: [Node; 2],
    histories: [History; 2],
    network: VecDeque<Envelope>,
    timers: VecDeque<(NodeId, TimerMessage)>,
}

impl Pair {
    fn new() -> Self {
        let mut pair = Self {
            nodes: [
                Node::new(NodeId(0), NodeConfig::default()),
                Node::new(NodeId(1), NodeConfig::default()),
            ],
            histories: [History::new(NodeId(0)), History::new(NodeId(1))],
            network: VecDeque::new(),
            timers: VecDeque::new(),
        };
        pair.apply(NodeId(0), NodeInput::Command(Command::AssignNeighbours(vec![NodeId(1)])));
        pair.apply(NodeId(1), NodeInput::Command(Command::AssignNeighbours(vec![NodeId(0)])));
        pair
    }

    fn apply(&mut self, id: NodeId, input: NodeInput) {
        let actions = self.nodes[id.index()].handle(input).expect("no protocol violation");
        for action in actions {
            match action {
                NodeAction::Send(envelope) => self.network.push_back(envelope),
                NodeAction::Schedule { timer, .. } => self.timers.push_back((id, timer)),
                NodeAction::Record(event) => {
                    self.histories[id.index()].record(std::time::Duration::ZERO, event);
                },
            }
        }
    }

    fn settle(&mut self) {
        loop {
            if let Some(envelope) = self.network.pop_front() {
                self.apply(envelope.to, NodeInput::Peer(envelope));
            } else if let Some((id, timer)) = self.timers.pop_front() {
                self.apply(id, NodeInput::Timer(timer));
            } else {
                break;
            }
        }
    }
}

#[test]
fn leaf_request_trace() {
    let mut pair = Pair::new();
    pair.apply(NodeId(0), NodeInput::Command(Command::DesignateRoot));
    pair.settle();
    pair.apply(NodeId(1), NodeInput::Command(Command::WantCs));
    pair.settle();

    insta::assert_snapshot!(pair.histories[1].lines().join("\n"), @r"
    Node 01 neighbourhood: [0]
    Node 01 received Initialize msg from node 00
    Node 01 received WantCS command
    Queue content of node 01: [1]
    Node 01 sent Request msg to node 00
    Node 01 received Privilege msg from node 00
    Queue content of node 01: []
    Node 01 entered CS
    Node 01 received ExitCS msg from node 01
    Node 01 exited CS
    ");

    insta::assert_snapshot!(pair.histories[0].lines().join("\n"), @r"
    Node 00 neighbourhood: [1]
    Node 00 received DesignateRoot command
    Node 00 sent Initialize msg to node 01
    Node 00 received Request msg from node 01
    Queue content of node 00: [1]
    Queue content of node 00: []
    Node 00 sent Privilege msg to node 01
    ");
}

#[test]
fn token_returns_to_root_on_demand() {
    let mut pair = Pair::new();
    pair.apply(NodeId(0), NodeInput::Command(Command::DesignateRoot));
    pair.settle();
    pair.apply(NodeId(1), NodeInput::Command(Command::WantCs));
    pair.settle();
    pair.apply(NodeId(0), NodeInput::Command(Command::WantCs));
    pair.settle();

    let root = &pair.nodes[0];
    assert!(root.holds_token());
    assert!(!root.is_using());
    assert_eq!(pair.nodes[1].holder(), Some(NodeId(0)));
    assert_eq!(pair.histories[0].count(|e| *e == tokentree_core::HistoryEvent::EnteredCs), 1);
    assert_eq!(pair.histories[1].count(|e| *e == tokentree_core::HistoryEvent::EnteredCs), 1);
}
