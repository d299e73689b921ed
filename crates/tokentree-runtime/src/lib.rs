//! Tokentree runtime.
//!
//! Production glue around [`tokentree_core`]: every [`tokentree_core::Node`]
//! runs as its own tokio task that drains a private inbox and executes the
//! node's actions with real channels and the tokio clock.
//!
//! # Components
//!
//! - [`NodeTask`]: per-node dispatch loop
//! - [`Transport`] / [`ChannelTransport`]: envelope delivery between tasks
//! - [`SystemEnv`]: tokio-backed [`tokentree_core::Environment`]
//! - [`Cluster`]: driver handle that bootstraps a tree and injects commands
//! - [`DriverCommand`]: parser for the interactive `<action><nodeId>` syntax

mod cluster;
mod command;
mod error;
pub mod report;
mod system_env;
mod task;
mod transport;

pub use cluster::{Cluster, ClusterConfig};
pub use command::{CommandParseError, DriverCommand, prompt};
pub use error::{RuntimeError, TransportError};
pub use system_env::SystemEnv;
pub use task::NodeTask;
pub use transport::{ChannelTransport, Inbound, Inbox, Mailbox, Transport};
