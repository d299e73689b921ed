//! End-to-end scenarios on the discrete-event simulator.
//!
//! Every run checks the standard invariants after each event and the history
//! oracles at the end.

use std::time::Duration;

use tokentree_core::{HistoryEvent, NodeConfig, Rejection};
use tokentree_harness::{timeline, InvariantRegistry, SimConfig, Simulator};
use tokentree_proto::{CommandKind, MessageKind, NodeId};

fn simulator(config: SimConfig) -> Simulator {
    Simulator::new(config).unwrap().with_invariants(InvariantRegistry::standard())
}

/// Ten-node binary tree with the token at node 0.
fn initialized(config: SimConfig) -> Simulator {
    let mut sim = simulator(config);
    sim.designate_root(NodeId(0)).unwrap();
    sim.run_until_quiescent().unwrap();
    sim
}

fn entries(sim: &Simulator, id: u32) -> usize {
    sim.history(NodeId(id)).unwrap().count(|event| *event == HistoryEvent::EnteredCs)
}

fn sent(sim: &Simulator, id: u32, kind: MessageKind) -> usize {
    sim.history(NodeId(id))
        .unwrap()
        .count(|event| matches!(event, HistoryEvent::Sent { kind: recorded, .. } if *recorded == kind))
}

fn has_event(sim: &Simulator, id: u32, wanted: &HistoryEvent) -> bool {
    sim.history(NodeId(id)).unwrap().count(|event| event == wanted) > 0
}

fn assert_oracles(sim: &Simulator) {
    if let Err(violations) = timeline::check_all(sim.histories()) {
        panic!("history oracles failed: {violations:?}");
    }
}

#[test]
fn root_designation_orients_every_holder_towards_root() {
    let sim = initialized(SimConfig::default());

    assert!(sim.node(NodeId(0)).unwrap().holds_token());
    for id in 1..10 {
        let node = sim.node(NodeId(id)).unwrap();
        assert_eq!(node.holder(), Some(NodeId((id - 1) / 2)), "holder of node {id}");
        assert!(!node.has_asked());
        assert!(node.queue().is_empty());
    }
    assert!(sim.is_quiescent());
}

#[test]
fn leaf_request_pulls_token_down_the_tree() {
    let mut sim = initialized(SimConfig::default());

    sim.request_cs(NodeId(8)).unwrap();
    sim.run_until_quiescent().unwrap();

    assert_eq!(entries(&sim, 8), 1);
    assert!(has_event(&sim, 8, &HistoryEvent::ExitedCs));

    // Token stays with the last user, path reversed behind it
    assert!(sim.node(NodeId(8)).unwrap().holds_token());
    assert_eq!(sim.node(NodeId(3)).unwrap().holder(), Some(NodeId(8)));
    assert_eq!(sim.node(NodeId(1)).unwrap().holder(), Some(NodeId(3)));
    assert_eq!(sim.node(NodeId(0)).unwrap().holder(), Some(NodeId(1)));
    assert_oracles(&sim);
}

#[test]
fn concurrent_requests_each_enter_once() {
    let mut sim = initialized(SimConfig { seed: 3, ..SimConfig::default() });

    for id in [0, 3, 7, 8] {
        sim.request_cs(NodeId(id)).unwrap();
    }
    sim.run_until_quiescent().unwrap();

    for id in [0, 3, 7, 8] {
        assert_eq!(entries(&sim, id), 1, "node {id}");
    }
    for id in [1, 2, 4, 5, 6, 9] {
        assert_eq!(entries(&sim, id), 0, "node {id}");
    }
    assert!(sim.rejections().is_empty());
    assert_oracles(&sim);
}

#[test]
fn every_node_is_served_across_seeds() {
    for seed in 0..8 {
        let mut sim = initialized(SimConfig { seed, ..SimConfig::default() });
        for id in 0..10 {
            sim.request_cs(NodeId(id)).unwrap();
        }
        sim.run_until_quiescent().unwrap();

        for id in 0..10 {
            assert_eq!(entries(&sim, id), 1, "seed {seed} node {id}");
        }
        assert_oracles(&sim);
    }
}

#[test]
fn chain_and_star_shapes_serve_every_node() {
    for fanout in [1, 9] {
        let mut sim = initialized(SimConfig { fanout, seed: 5, ..SimConfig::default() });
        for id in (0..10).rev() {
            sim.request_cs(NodeId(id)).unwrap();
        }
        sim.run_until_quiescent().unwrap();

        for id in 0..10 {
            assert_eq!(entries(&sim, id), 1, "fanout {fanout} node {id}");
        }
        assert_oracles(&sim);
    }
}

#[test]
fn path_node_failure_delays_but_serves_pending_request() {
    let mut sim = initialized(SimConfig::default());

    sim.fail(NodeId(1)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    assert!(sim.node(NodeId(1)).unwrap().in_failure_mode());

    sim.request_cs(NodeId(8)).unwrap();
    sim.run_until_quiescent().unwrap();

    assert_eq!(entries(&sim, 8), 1);
    assert_eq!(sim.crashes(NodeId(1)), 1);
    assert!(has_event(&sim, 1, &HistoryEvent::Failed));
    assert!(has_event(&sim, 1, &HistoryEvent::EnteredRecovery));
    assert!(has_event(&sim, 1, &HistoryEvent::ExitedRecovery));
    assert_eq!(sent(&sim, 1, MessageKind::Restart), 3);
    for peer in [0, 3, 4] {
        assert_eq!(sent(&sim, peer, MessageKind::Advise), 1, "node {peer}");
    }

    let first_enter = sim
        .history(NodeId(8))
        .unwrap()
        .entries()
        .iter()
        .find(|entry| entry.event == HistoryEvent::EnteredCs)
        .map(|entry| entry.at)
        .unwrap();
    assert!(first_enter >= NodeConfig::default().failure_duration);
    assert_oracles(&sim);
}

#[test]
fn idle_token_holder_recovers_the_token() {
    let mut sim = initialized(SimConfig { seed: 9, ..SimConfig::default() });

    sim.fail(NodeId(0)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    sim.request_cs(NodeId(9)).unwrap();
    sim.run_until_quiescent().unwrap();

    assert_eq!(entries(&sim, 9), 1);
    assert!(sim.node(NodeId(9)).unwrap().holds_token());
    assert!(has_event(&sim, 0, &HistoryEvent::ExitedRecovery));
    assert_oracles(&sim);
}

#[test]
fn recovered_node_serves_later_requests() {
    let mut sim = initialized(SimConfig::default());

    sim.fail(NodeId(4)).unwrap();
    sim.run_until_quiescent().unwrap();
    assert!(!sim.node(NodeId(4)).unwrap().in_failure_mode());
    assert_eq!(sim.node(NodeId(4)).unwrap().holder(), Some(NodeId(1)));

    for id in [9, 4, 2] {
        sim.request_cs(NodeId(id)).unwrap();
    }
    sim.run_until_quiescent().unwrap();

    for id in [9, 4, 2] {
        assert_eq!(entries(&sim, id), 1, "node {id}");
    }
    assert_oracles(&sim);
}

#[test]
fn fail_is_rejected_in_critical_section() {
    let mut sim = initialized(SimConfig::default());

    sim.request_cs(NodeId(0)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    assert!(sim.node(NodeId(0)).unwrap().is_using());

    sim.fail(NodeId(0)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();

    let rejection = sim.rejections()[0];
    assert_eq!(rejection.node, NodeId(0));
    assert_eq!(rejection.command, CommandKind::Fail);
    assert_eq!(rejection.reason, Rejection::InCriticalSection);
    assert!(sim.node(NodeId(0)).unwrap().is_using());
    assert_eq!(sim.crashes(NodeId(0)), 0);
}

#[test]
fn want_cs_is_rejected_while_failed() {
    let mut sim = initialized(SimConfig::default());

    sim.fail(NodeId(5)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    sim.request_cs(NodeId(5)).unwrap();
    sim.run_until_quiescent().unwrap();

    assert_eq!(sim.rejections().len(), 1);
    assert_eq!(sim.rejections()[0].command, CommandKind::WantCs);
    assert_eq!(sim.rejections()[0].reason, Rejection::Failed);
    assert_eq!(entries(&sim, 5), 0);
    assert!(has_event(
        &sim,
        5,
        &HistoryEvent::CommandRejected { command: CommandKind::WantCs, reason: Rejection::Failed }
    ));
}

#[test]
fn fail_is_rejected_before_initialization_and_during_recovery() {
    let mut sim = simulator(SimConfig::default());
    sim.fail(NodeId(3)).unwrap();
    sim.run_until_quiescent().unwrap();
    assert_eq!(sim.rejections()[0].reason, Rejection::Uninitialized);

    sim.designate_root(NodeId(0)).unwrap();
    sim.run_until_quiescent().unwrap();

    sim.fail(NodeId(4)).unwrap();
    sim.run_for(NodeConfig::default().failure_duration).unwrap();
    assert!(sim.node(NodeId(4)).unwrap().in_recovery_mode());

    sim.fail(NodeId(4)).unwrap();
    sim.run_until_quiescent().unwrap();
    assert_eq!(sim.rejections()[1].reason, Rejection::Recovering);
    assert_eq!(sim.crashes(NodeId(4)), 1);
}

#[test]
fn combined_handoff_saves_a_request() {
    let config = SimConfig {
        node: NodeConfig { combine_privilege_and_request: true, ..NodeConfig::default() },
        ..SimConfig::default()
    };
    let mut sim = initialized(config);

    // Root busy while both requests queue up at node 1
    sim.request_cs(NodeId(0)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    sim.request_cs(NodeId(7)).unwrap();
    sim.request_cs(NodeId(9)).unwrap();
    sim.run_until_quiescent().unwrap();

    for id in [0, 7, 9] {
        assert_eq!(entries(&sim, id), 1, "node {id}");
    }
    assert_eq!(sent(&sim, 1, MessageKind::PrivilegeAndRequest), 1);
    assert_eq!(sent(&sim, 1, MessageKind::Request), 1);
    assert_oracles(&sim);
}

#[test]
fn census_reissued_request_holds_until_token_arrives() {
    let config = SimConfig {
        nodes: 3,
        fanout: 1,
        node: NodeConfig { cs_duration: Duration::from_secs(20), ..NodeConfig::default() },
        ..SimConfig::default()
    };
    let mut sim = initialized(config);
    let failure = sim.config().node.failure_duration;

    // Root sits in the critical section while the leaf's request is pending
    sim.request_cs(NodeId(0)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    sim.request_cs(NodeId(2)).unwrap();
    sim.run_for(Duration::from_millis(100)).unwrap();
    assert!(sim.node(NodeId(2)).unwrap().has_asked());

    sim.fail(NodeId(2)).unwrap();
    sim.run_for(Duration::from_millis(1)).unwrap();
    sim.run_for(failure + Duration::from_secs(1)).unwrap();

    // Parent still queues the forgotten request, so the census asks again
    let leaf = sim.node(NodeId(2)).unwrap();
    assert!(!leaf.in_recovery_mode());
    assert!(leaf.has_asked());
    assert!(leaf.queue().is_empty());
    assert_eq!(leaf.holder(), Some(NodeId(1)));
    assert!(sim.has_census_ask(NodeId(2)));

    sim.run_until_quiescent().unwrap();

    let leaf = sim.node(NodeId(2)).unwrap();
    assert!(leaf.holds_token());
    assert!(!leaf.has_asked());
    assert!(!sim.has_census_ask(NodeId(2)));
    assert_eq!(entries(&sim, 2), 0);
    assert_eq!(sim.crashes(NodeId(2)), 1);
    assert_oracles(&sim);
}

#[test]
fn leaf_history_reads_as_expected() {
    let config = SimConfig {
        nodes: 3,
        fanout: 1,
        min_latency: Duration::from_millis(1),
        max_latency: Duration::from_millis(1),
        ..SimConfig::default()
    };
    let mut sim = initialized(config);
    sim.request_cs(NodeId(2)).unwrap();
    sim.run_until_quiescent().unwrap();

    insta::assert_snapshot!(sim.history(NodeId(2)).unwrap().lines().join("\n"), @r"
    Node 02 created, greedy: false
    Node 02 neighbourhood: [1]
    Node 02 received Initialize msg from node 01
    Node 02 received WantCS command
    Queue content of node 02: [2]
    Node 02 sent Request msg to node 01
    Node 02 received Privilege msg from node 01
    Queue content of node 02: []
    Node 02 entered CS
    Node 02 received ExitCS msg from node 02
    Node 02 exited CS
    ");
}
