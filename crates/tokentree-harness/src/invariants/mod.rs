//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every event, whatever the
//! interleaving of messages, timers and crashes. Unlike example-based tests
//! that check specific scenarios, they are evaluated continuously by the
//! [`crate::Simulator`] when a registry is attached.
//!
//! # Architecture
//!
//! The simulator extracts observable state into a [`SystemSnapshot`], then
//! runs every registered [`Invariant`] against it.
//!
//! # Usage
//!
//! ```ignore
//! let mut sim = Simulator::new(SimConfig::default())?
//!     .with_invariants(InvariantRegistry::standard());
//! sim.designate_root(NodeId(0))?;
//! sim.run_until_quiescent()?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    AskedConsistency, HolderOrientation, MutualExclusion, SingleTokenHolder, UniqueQueueEntries,
};
pub use snapshot::{ModeSnapshot, NodeSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against system state.
///
/// Invariants are behavioral properties that must always hold.
/// They capture WHAT must be true, not specific test scenarios.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;

    /// Shorthand for building a violation of this invariant.
    fn violation(&self, message: String) -> Violation {
        Violation { invariant: self.name(), message }
    }
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against system state.
/// Use [`InvariantRegistry::standard()`] for the protocol's safety properties.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.invariants.iter().map(|inv| inv.name())).finish()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the protocol's safety invariants.
    ///
    /// Includes:
    /// - [`MutualExclusion`]: at most one node in the critical section
    /// - [`UniqueQueueEntries`]: no id queued twice at one node
    /// - [`AskedConsistency`]: `asked` agrees with holder and queue
    /// - [`SingleTokenHolder`]: at most one token, held or in flight
    /// - [`HolderOrientation`]: at rest, holder pointers lead to the token
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MutualExclusion);
        registry.add(UniqueQueueEntries);
        registry.add(AskedConsistency);
        registry.add(SingleTokenHolder);
        registry.add(HolderOrientation);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
