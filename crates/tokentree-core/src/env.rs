//! Environment abstraction for deterministic testing.
//!
//! The protocol core never reads a clock. Drivers do: they stamp history
//! entries with elapsed time and turn `Schedule` actions into delayed
//! self-deliveries. Production drivers use the tokio clock; simulations use
//! virtual time.

use std::time::Duration;

/// Abstract clock and sleep provider for node drivers.
///
/// # Invariants
///
/// - `now()` never goes backwards
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this. Protocol logic expresses delays as
    /// [`crate::NodeAction::Schedule`].
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Time elapsed since `start`.
    fn elapsed_since(&self, start: Self::Instant) -> Duration {
        self.now() - start
    }
}
