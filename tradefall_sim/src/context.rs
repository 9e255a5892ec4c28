//! Simulation context implementing TradefallContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tradefall_env::TradefallContext;

/// Simulation context backed by a virtual clock.
///
/// This implements `TradefallContext` using:
/// - A virtual clock that only moves when the harness advances it
/// - Sleeps that park until virtual time reaches their deadline
/// - Seeded ChaCha8 streams derived from one master seed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Wakes sleepers whenever virtual time moves
    tick: Arc<Notify>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            tick: Arc::new(Notify::new()),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration and wakes due sleepers.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        self.tick.notify_waiters();
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.virtual_time_ns.store(time_ns, Ordering::SeqCst);
        self.tick.notify_waiters();
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent RNG stream for one subsystem.
    pub fn rng_for(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            tick: Arc::clone(&self.tick),
        }
    }
}

#[async_trait]
impl TradefallContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.time_ns().saturating_add(duration.as_nanos() as u64);
        loop {
            // Register before checking so an advance in between is not missed
            let advanced = self.tick.notified();
            if self.time_ns() >= deadline {
                return;
            }
            advanced.await;
        }
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = name, "spawning simulated task");
        tokio::spawn(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        ctx.set_time(0);
        assert_eq!(ctx.time_ns(), 0);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[test]
    fn test_rng_streams_deterministic() {
        let a = SimContext::new(7);
        let b = SimContext::new(7);

        let x: u64 = a.rng_for(1).gen();
        assert_eq!(x, b.rng_for(1).gen::<u64>());
        assert_ne!(x, a.rng_for(2).gen::<u64>());
    }

    #[tokio::test]
    async fn test_sleep_waits_for_virtual_time() {
        let ctx = SimContext::shared(1);
        let sleeper = Arc::clone(&ctx);
        let task = tokio::spawn(async move {
            sleeper.sleep(Duration::from_millis(100)).await;
            sleeper.now()
        });

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        ctx.advance_time(Duration::from_millis(60));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        ctx.advance_time(Duration::from_millis(40));
        assert_eq!(task.await.unwrap(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let ctx = SimContext::new(1);
        ctx.sleep(Duration::ZERO).await;
        assert_eq!(ctx.now(), Duration::ZERO);
    }
}
