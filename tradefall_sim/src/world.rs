//! SimWorld - The simulation harness container.
//!
//! Wires the real pipeline (feed listener, admission queue, simulation clock)
//! to a virtual clock and a scripted feed. Both pipeline tasks run on the
//! current tokio runtime; the harness moves time forward in small steps and
//! lets the tasks settle after each one.

use crate::context::SimContext;
use crate::error::SimError;
use crate::network::{FeedController, ScriptedTransport};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tradefall_core::shutdown::{self, ShutdownTrigger};
use tradefall_core::{
    AdmissionQueue, ClockHandle, EventDecoder, FeedError, FeedListener, FeedStats,
    FeedStatsSnapshot, FrameSnapshot, IdGenerator, Simulation, SimulationClock, SnapshotReceiver,
    TradefallConfig,
};
use tradefall_env::TradefallContext;
use tracing::debug;

/// Yields granted to the pipeline tasks after each time step.
const SETTLE_YIELDS: usize = 16;

/// Upper bound on extra yields spent draining queued feed frames.
const DRAIN_YIELD_LIMIT: usize = 100_000;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Virtual time advanced per harness step
    pub step: Duration,

    /// Pipeline settings under test
    pub pipeline: TradefallConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut pipeline = TradefallConfig::default();
        // Harness feeds are reliable enough to retry quickly
        pipeline.feed.initial_backoff_ms = 100;
        pipeline.feed.max_backoff_ms = 1_000;
        Self {
            seed: 42,
            step: Duration::from_millis(1),
            pipeline,
        }
    }
}

/// Final state of a finished world.
pub struct WorldOutcome {
    pub simulation: Simulation,
    pub feed: Result<FeedStatsSnapshot, FeedError>,
    pub final_time: Duration,
}

struct Running {
    clock: ClockHandle,
    snapshots: SnapshotReceiver,
    feed_task: JoinHandle<Result<FeedStatsSnapshot, FeedError>>,
    feed_shutdown: ShutdownTrigger,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Feed controller for fault injection
    pub feed: FeedController,

    queue: AdmissionQueue,
    ids: Arc<IdGenerator>,
    feed_stats: Option<Arc<FeedStats>>,
    transport: Option<ScriptedTransport>,
    running: Option<Running>,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.pipeline.validate()?;

        let context = SimContext::shared(config.seed);
        let (feed, transport) = FeedController::new();
        let ids = Arc::new(IdGenerator::starting_at(config.pipeline.decoder.first_id));

        Ok(Self {
            config,
            context,
            feed,
            queue: AdmissionQueue::new(),
            ids,
            feed_stats: None,
            transport: Some(transport),
            running: None,
        })
    }

    /// Spawns the feed listener and the simulation clock.
    ///
    /// Must be called from within a tokio runtime. Calling it twice is a no-op.
    pub async fn start(&mut self) {
        let transport = match self.transport.take() {
            Some(t) => t,
            None => return,
        };
        let pipeline = &self.config.pipeline;

        let decoder = EventDecoder::new(&pipeline.decoder, Arc::clone(&self.ids));
        let listener = FeedListener::new(
            Arc::clone(&self.context),
            transport,
            decoder,
            self.queue.clone(),
            &pipeline.feed,
        );
        self.feed_stats = Some(listener.stats());

        let (feed_shutdown, feed_signal) = shutdown::channel();
        let feed_task = tokio::spawn(listener.run(feed_signal));

        let simulation = Simulation::new(pipeline, self.queue.clone());
        let clock =
            SimulationClock::new(Arc::clone(&self.context), &pipeline.clock, simulation).start();
        let snapshots = clock.snapshots();

        self.running = Some(Running {
            clock,
            snapshots,
            feed_task,
            feed_shutdown,
        });
        self.settle().await;
    }

    /// Lets spawned tasks run until they park again.
    pub async fn settle(&self) {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    /// Advances virtual time one step and settles.
    pub async fn step(&self) {
        self.context.advance_time(self.config.step);
        self.settle().await;
    }

    /// Advances virtual time by `duration` in configured steps.
    pub async fn advance(&self, duration: Duration) {
        let target = self.context.now() + duration;
        while self.context.now() + self.config.step <= target {
            self.step().await;
        }
        let rest = target.saturating_sub(self.context.now());
        if !rest.is_zero() {
            self.context.advance_time(rest);
            self.settle().await;
        }
    }

    /// Jumps virtual time forward in one go, as after a process stall.
    pub async fn stall(&self, duration: Duration) {
        debug!(stall_ms = duration.as_millis() as u64, "injecting clock stall");
        self.context.advance_time(duration);
        self.settle().await;
    }

    /// Yields until the listener has read every queued feed frame.
    pub async fn drain_feed(&self) {
        let mut spent = 0;
        while self.feed.pending() > 0 && spent < DRAIN_YIELD_LIMIT {
            tokio::task::yield_now().await;
            spent += 1;
        }
    }

    /// The most recently published render frame.
    pub fn latest_frame(&self) -> Arc<FrameSnapshot> {
        match &self.running {
            Some(running) => running.snapshots.borrow().clone(),
            None => Arc::new(FrameSnapshot::default()),
        }
    }

    /// Live feed counters (zero before `start`).
    pub fn feed_stats(&self) -> FeedStatsSnapshot {
        self.feed_stats
            .as_ref()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Id the decoder will hand out next.
    pub fn next_id(&self) -> u64 {
        self.ids.peek().as_u64()
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Flushes in-flight trades into the pool, then stops both tasks.
    pub async fn finish(mut self) -> Result<WorldOutcome, SimError> {
        let running = self.running.take().ok_or(SimError::NotStarted)?;

        self.drain_feed().await;
        self.settle().await;
        // One full admission interval so the final batch is admitted
        let flush = self.config.pipeline.clock.admission_interval();
        self.advance(flush).await;

        let _ = running.feed_shutdown.send(true);
        let feed = running.feed_task.await.map_err(|_| SimError::TaskLost("feed listener"))?;
        let simulation = running.clock.stop().await?;

        Ok(WorldOutcome {
            simulation,
            feed,
            final_time: self.context.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradefall_core::{EntityId, Side};

    #[test]
    fn test_invalid_pipeline_rejected() {
        let mut config = SimConfig::default();
        config.pipeline.clock.admission_interval_ms = 0;

        assert!(matches!(SimWorld::new(config), Err(SimError::Config(_))));
    }

    #[tokio::test]
    async fn test_world_admits_pushed_trade() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.start().await;
        assert!(world.feed.is_connected());
        assert_eq!(world.feed.sent().len(), 1);

        assert!(world.feed.push(r#"{"e":"trade","m":true,"q":"2","p":"50"}"#));
        world.advance(Duration::from_millis(60)).await;

        let frame = world.latest_frame();
        assert_eq!(frame.entities.len(), 1);
        assert_eq!(frame.entities[0].id, EntityId(1));
        assert_eq!(frame.entities[0].side, Side::Sell);

        let outcome = world.finish().await.unwrap();
        assert_eq!(outcome.simulation.stats().admitted, 1);
        assert_eq!(outcome.feed.unwrap().trades, 1);
    }

    #[tokio::test]
    async fn test_world_time_advances_in_steps() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        world.start().await;

        world.advance(Duration::from_millis(1_000)).await;
        assert!((world.time() - 1.0).abs() < 1e-9);

        let outcome = world.finish().await.unwrap();
        let stats = outcome.simulation.stats();
        // 1.05 s of virtual time in total
        assert_eq!(stats.admission_ticks, 21);
        assert_eq!(stats.frame_ticks, 63);
    }

    #[tokio::test]
    async fn test_finish_before_start_fails() {
        let world = SimWorld::new(SimConfig::default()).unwrap();
        assert!(matches!(world.finish().await, Err(SimError::NotStarted)));
    }
}
