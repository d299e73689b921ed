//! Fuzz target for protocol nodes under random load and crashes
//!
//! # Strategy
//!
//! - Tree shape: 1 to 16 nodes, fan-out 1 to 4
//! - Operations: requests, crashes (kept inside the failure model) and clock
//!   advances, generated by `arbitrary`
//!
//! # Invariants
//!
//! - Standard invariants hold after every simulated event
//! - No node ever reports a protocol violation
//! - Once drained, every node that asks again is served
//! - Recorded histories pass the timeline oracles

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokentree_core::{HistoryEvent, NodeConfig};
use tokentree_harness::{timeline, InvariantRegistry, Operation, SimConfig, Simulator};
use tokentree_proto::NodeId;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    nodes: u8,
    fanout: u8,
    seed: u64,
    ops: Vec<Operation>,
}

fuzz_target!(|scenario: Scenario| {
    let nodes = u32::from(scenario.nodes % 16) + 1;
    let config = SimConfig {
        nodes,
        fanout: u32::from(scenario.fanout % 4) + 1,
        seed: scenario.seed,
        node: NodeConfig {
            cs_duration: Duration::from_millis(30),
            failure_duration: Duration::from_millis(100),
            ..NodeConfig::default()
        },
        event_budget: 200_000,
        ..SimConfig::default()
    };

    let mut sim = Simulator::new(config)
        .expect("valid tree")
        .with_invariants(InvariantRegistry::standard());
    sim.designate_root(NodeId(0)).expect("root exists");
    sim.run_until_quiescent().expect("initialization drains");

    for op in scenario.ops.iter().take(256) {
        if let Err(err) = op.apply(&mut sim) {
            panic!("{op:?}: {err}");
        }
    }
    sim.run_until_quiescent().expect("cluster drains");

    let marks: Vec<usize> = sim.histories().iter().map(|history| history.entries().len()).collect();
    for id in 0..nodes {
        sim.request_cs(NodeId(id)).expect("node exists");
    }
    sim.run_until_quiescent().expect("final round drains");

    for (history, mark) in sim.histories().iter().zip(marks) {
        assert!(
            history.position_from(mark, |event| *event == HistoryEvent::EnteredCs).is_some(),
            "node {} starved",
            history.node()
        );
    }

    if let Err(violations) = timeline::check_all(sim.histories()) {
        panic!("history oracles: {violations:?}");
    }
});
