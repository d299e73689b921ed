//! Node configuration.

use std::time::Duration;

/// Time a node occupies the critical section before releasing it.
pub const DEFAULT_CS_DURATION: Duration = Duration::from_secs(5);

/// Time a failed node stays down before starting recovery.
pub const DEFAULT_FAILURE_DURATION: Duration = Duration::from_secs(5);

/// Per-node protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Delay between entering the critical section and the `ExitCS` timer
    pub cs_duration: Duration,
    /// Delay between `Fail` and the `StartRecovery` timer
    pub failure_duration: Duration,
    /// Hand the token over with `PrivilegeAndRequest` when more requests are
    /// still queued, instead of `Privilege` followed by `Request`
    pub combine_privilege_and_request: bool,
    /// Reserved. Reported in the creation history line only.
    pub greedy: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cs_duration: DEFAULT_CS_DURATION,
            failure_duration: DEFAULT_FAILURE_DURATION,
            combine_privilege_and_request: false,
            greedy: false,
        }
    }
}
