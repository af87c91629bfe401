//! Time source for debounce windows.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Delays used by the streaming coordinator.
///
/// Swap in a custom clock to observe or control debounce timing in tests.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// Completes after `duration` has elapsed.
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by `tokio::time`, so tokio's paused test clock applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
