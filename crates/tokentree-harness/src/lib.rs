//! Deterministic simulation harness for tokentree protocol testing.
//!
//! Two ways of running a cluster without real time or real sockets:
//!
//! - [`Simulator`]: a discrete-event loop that drives [`tokentree_core::Node`]s
//!   directly, with seeded per-link latency and FIFO links
//! - [`sim_network`]: turmoil hosts running the production runtime over
//!   simulated TCP
//!
//! # Invariant Testing
//!
//! The `invariants` module checks safety properties against a
//! [`SystemSnapshot`] after every simulator event. Use
//! [`InvariantRegistry::standard()`] for the protocol's invariants. The
//! [`timeline`] oracles check the same properties from recorded histories.
//!
//! # Model-Based Testing
//!
//! [`Operation`]s are generated randomly and applied to a simulator inside
//! the protocol's failure model.

pub mod event;
pub mod invariants;
pub mod model;
pub mod sim_network;
pub mod simulator;
pub mod timeline;

pub use event::{Event, ScheduledEvent};
pub use invariants::{
    AskedConsistency, HolderOrientation, Invariant, InvariantRegistry, InvariantResult,
    ModeSnapshot, MutualExclusion, NodeSnapshot, SingleTokenHolder, SystemSnapshot,
    UniqueQueueEntries, Violation,
};
pub use model::{Applied, ModelNodeId, Operation};
pub use sim_network::{ControlClient, TcpTransport};
pub use simulator::{RejectedCommand, SimConfig, SimError, Simulator};
