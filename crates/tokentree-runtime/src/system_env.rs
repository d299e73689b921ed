//! Production environment backed by the tokio clock.
//!
//! `tokio::time` is used for both reading and sleeping so that the whole
//! runtime follows virtual time when the clock is paused (`start_paused`
//! tests) or driven by a network simulator.

use std::time::Duration;

use tokentree_core::Environment;

/// Environment using `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
