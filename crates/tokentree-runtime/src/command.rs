//! Interactive driver syntax.
//!
//! A line holds whitespace-separated `<action><nodeId>` tokens, applied left to
//! right:
//!
//! | Token | Effect                               |
//! |-------|--------------------------------------|
//! | `c3`  | node 3 requests the critical section |
//! | `f3`  | node 3 fails                         |
//! | `p3`  | print the history of node 3          |
//! | `e`   | exit                                 |
//!
//! Invalid tokens are reported and skipped; they never reach a node.

use thiserror::Error;
use tokentree_proto::NodeId;

/// One parsed driver token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    /// `c<id>`
    RequestCs(NodeId),
    /// `f<id>`
    Fail(NodeId),
    /// `p<id>`
    PrintHistory(NodeId),
    /// `e`
    Exit,
}

/// Why a token was not understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    /// First character is not a known action
    #[error("unknown action in {0:?}")]
    UnknownAction(String),

    /// Node id is missing or not a number
    #[error("invalid node id in {0:?}")]
    InvalidNodeId(String),

    /// Node id outside the cluster
    #[error("node {id} outside 0..{nodes}")]
    OutOfRange {
        /// Parsed id
        id: u32,
        /// Cluster size
        nodes: u32,
    },
}

impl DriverCommand {
    /// Diagnostic printed for any invalid token.
    pub const INVALID: &'static str = ">>> Not valid action code <<<";

    /// Parse a single token for a cluster of `nodes` nodes.
    pub fn parse(token: &str, nodes: u32) -> Result<Self, CommandParseError> {
        let mut chars = token.chars();
        let action = chars.next().ok_or_else(|| CommandParseError::UnknownAction(token.to_string()))?;
        let rest = chars.as_str();

        if action == 'e' && rest.is_empty() {
            return Ok(Self::Exit);
        }

        let build: fn(NodeId) -> Self = match action {
            'c' => Self::RequestCs,
            'f' => Self::Fail,
            'p' => Self::PrintHistory,
            _ => return Err(CommandParseError::UnknownAction(token.to_string())),
        };

        let id: u32 = rest.parse().map_err(|_| CommandParseError::InvalidNodeId(token.to_string()))?;
        if id >= nodes {
            return Err(CommandParseError::OutOfRange { id, nodes });
        }

        Ok(build(NodeId(id)))
    }

    /// Parse every token of `line`, keeping failures in place.
    pub fn parse_line(line: &str, nodes: u32) -> Vec<Result<Self, CommandParseError>> {
        line.split_whitespace().map(|token| Self::parse(token, nodes)).collect()
    }
}

/// Prompt shown before each interactive line.
#[must_use]
pub fn prompt(nodes: u32) -> String {
    format!(
        ">>> Type a sequence of <action><nodeId> pairs (separated by spaces) in order to say what you want to do <<<\n\
         >>> Actions: 'c', ask for CS ; 'f', fail ; 'p', print history <<<\n\
         >>> Node ids: 0 - {} <<<\n\
         >>> Or type 'e' to exit <<<\n",
        nodes.saturating_sub(1)
    )
}
