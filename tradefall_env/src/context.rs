//! Core environment context trait for the Tradefall pipeline.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The central interface for time and task management.
///
/// The simulation clock and the feed listener never touch `tokio::time`
/// directly; they go through this trait so the same code runs against the
/// wall clock in production and against a virtual clock in tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` (in `tradefall_sim`) - manually advanced clock
#[async_trait]
pub trait TradefallContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Both simulation cadences compute their deadlines from this value.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: parks until the harness advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;
}
