//! Tokentree protocol core.
//!
//! A Sans-IO implementation of token-based mutual exclusion over a fixed tree
//! of nodes, with crash/recovery. Each [`Node`] owns its protocol state and
//! turns one input (driver command, peer message, or timer) into a list of
//! [`NodeAction`]s for the surrounding runtime to execute. Nothing in this
//! crate performs I/O or reads a clock.
//!
//! - [`node`]: the protocol state machine
//! - [`queue`]: per-node FIFO of pending token requests
//! - [`recovery`]: the Restart/Advise census a restarted node runs
//! - [`history`]: append-only per-node event log
//! - [`topology`]: static neighbour maps
//! - [`env`]: clock abstraction for drivers

pub mod config;
pub mod env;
pub mod error;
pub mod history;
pub mod node;
pub mod queue;
pub mod recovery;
pub mod topology;

pub use config::NodeConfig;
pub use env::Environment;
pub use error::{NodeError, Rejection, TopologyError};
pub use history::{History, HistoryEntry, HistoryEvent};
pub use node::{Mode, Node, NodeAction, NodeInput};
pub use queue::RequestQueue;
pub use recovery::{CensusOutcome, RecoveryCensus};
pub use topology::Topology;
