//! Simulation driver - ties admission, physics and expiry to two cadences.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 SimulationClock<Ctx>                        │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ Context: TradefallContext                            │  │
//! │  │  • now()   → deadlines for both cadences             │  │
//! │  │  • sleep() → wait for the nearer deadline            │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │   admission tick (50 ms)         frame tick (60 Hz)        │
//! │   queue.drain_all()              stepper.step_all(dt)      │
//! │   pool.admit_batch()             monitor.sweep()           │
//! │                                  publish FrameSnapshot     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let queue = AdmissionQueue::new();
//! let simulation = Simulation::new(&config, queue.clone());
//! let clock = SimulationClock::new(TokioContext::shared(), &config.clock, simulation);
//! let handle = clock.start();
//! // ... feed task enqueues into `queue`, renderer reads handle.snapshots() ...
//! let simulation = handle.stop().await?;
//! ```

use crate::admission::AdmissionQueue;
use crate::config::{ClockConfig, TradefallConfig};
use crate::entity::{EntityId, EntitySnapshot};
use crate::error::SimulationError;
use crate::lifecycle::LifecycleMonitor;
use crate::metrics::SimulationStats;
use crate::physics::PhysicsStepper;
use crate::pool::EntityPool;
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tradefall_env::TradefallContext;

/// The simulated world: pool plus the stateless operators that act on it.
///
/// Owned by the driver task; nothing else mutates entity state.
#[derive(Debug)]
pub struct Simulation {
    queue: AdmissionQueue,
    pool: EntityPool,
    stepper: PhysicsStepper,
    monitor: LifecycleMonitor,
    stats: SimulationStats,
}

impl Simulation {
    /// Creates a simulation that admits from `queue`.
    pub fn new(config: &TradefallConfig, queue: AdmissionQueue) -> Self {
        Self {
            queue,
            pool: EntityPool::new(config.spawn.clone()),
            stepper: PhysicsStepper::new(&config.physics),
            monitor: LifecycleMonitor::new(&config.lifecycle),
            stats: SimulationStats::default(),
        }
    }

    /// Drains the admission queue into the pool. Returns the batch size.
    pub fn admission_tick(&mut self) -> usize {
        let batch = self.queue.drain_all();
        let admitted = self.pool.admit_batch(batch);

        self.stats.admission_ticks += 1;
        self.stats.admitted += admitted as u64;
        self.stats.largest_batch = self.stats.largest_batch.max(admitted);
        self.stats.peak_live = self.stats.peak_live.max(self.pool.len());

        if admitted > 0 {
            debug!(admitted, live = self.pool.len(), "admitted batch");
        }
        admitted
    }

    /// Steps physics by `delta_time` seconds, then sweeps expired entities.
    pub fn frame_tick(&mut self, delta_time: f64) -> Vec<EntityId> {
        self.stepper.step_all(&mut self.pool, delta_time);
        let expired = self.monitor.sweep(&mut self.pool);

        self.stats.frame_ticks += 1;
        self.stats.expired += expired.len() as u64;
        expired
    }

    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.pool.snapshot()
    }

    pub fn pool(&self) -> &EntityPool {
        &self.pool
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }
}

/// One published render frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameSnapshot {
    /// Frame tick counter
    pub frame: u64,

    /// Clock time of the frame in seconds
    pub time_secs: f64,

    /// All live entities, ordered by id
    pub entities: Vec<EntitySnapshot>,
}

/// Renderer-side handle to the latest published frame.
pub type SnapshotReceiver = watch::Receiver<Arc<FrameSnapshot>>;

/// What a single [`SimulationClock::pump`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    pub admission_ticks: u32,
    pub frame_ticks: u32,
    pub admitted: usize,
    pub expired: Vec<EntityId>,
}

/// Drives a [`Simulation`] on two cadences read from a [`TradefallContext`].
///
/// Missed deadlines are skipped rather than replayed: after a stall the
/// admission tick runs once and the frame tick runs once with the real
/// elapsed delta, capped by `max_frame_delta`.
pub struct SimulationClock<Ctx: TradefallContext> {
    context: Arc<Ctx>,
    simulation: Simulation,
    admission_interval: Duration,
    frame_interval: Duration,
    max_frame_delta: Option<Duration>,
    clock_config: ClockConfig,
    origin: Duration,
    frame_index: u64,
    next_admission: Duration,
    next_frame: Duration,
    last_frame: Duration,
    snapshot_tx: watch::Sender<Arc<FrameSnapshot>>,
}

impl<Ctx: TradefallContext> SimulationClock<Ctx> {
    /// Creates a clock whose first ticks fall one interval after `context.now()`.
    pub fn new(context: Arc<Ctx>, config: &ClockConfig, simulation: Simulation) -> Self {
        let now = context.now();
        let admission_interval = config.admission_interval();
        let frame_interval = config.frame_interval();
        let (snapshot_tx, _) = watch::channel(Arc::new(FrameSnapshot::default()));

        Self {
            context,
            simulation,
            admission_interval,
            frame_interval,
            max_frame_delta: config.max_frame_delta(),
            clock_config: config.clone(),
            origin: now,
            frame_index: 1,
            next_admission: now + admission_interval,
            next_frame: now + config.frame_offset(1),
            last_frame: now,
            snapshot_tx,
        }
    }

    /// Subscribes to published frames.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn into_simulation(self) -> Simulation {
        self.simulation
    }

    /// The earlier of the two pending deadlines.
    pub fn next_deadline(&self) -> Duration {
        self.next_admission.min(self.next_frame)
    }

    /// Runs whichever ticks are due at `context.now()`: admission first.
    pub fn pump(&mut self) -> PumpReport {
        let now = self.context.now();
        let mut report = PumpReport::default();

        if self.next_admission <= now {
            report.admitted = self.simulation.admission_tick();
            report.admission_ticks = 1;
            self.next_admission = next_after(self.next_admission, self.admission_interval, now);
        }

        if self.next_frame <= now {
            let mut delta = now.saturating_sub(self.last_frame);
            if let Some(cap) = self.max_frame_delta {
                if delta > cap {
                    debug!(delta_ms = delta.as_millis() as u64, "capping frame delta after stall");
                    delta = cap;
                }
            }

            report.expired = self.simulation.frame_tick(delta.as_secs_f64());
            report.frame_ticks = 1;
            self.last_frame = now;
            self.advance_frame_deadline(now);
            self.publish(now);
        }

        report
    }

    /// Moves to the first frame on the grid strictly after `now`.
    fn advance_frame_deadline(&mut self, now: Duration) {
        let elapsed = now.saturating_sub(self.origin).as_nanos();
        let hz = u128::from(self.clock_config.frame_rate_hz.max(1));
        let passed = u64::try_from(elapsed * hz / 1_000_000_000).unwrap_or(u64::MAX - 1);

        let mut index = passed.max(self.frame_index) + 1;
        while self.origin + self.clock_config.frame_offset(index) <= now {
            index += 1;
        }
        self.frame_index = index;
        self.next_frame = self.origin + self.clock_config.frame_offset(index);
    }

    fn publish(&self, now: Duration) {
        let frame = FrameSnapshot {
            frame: self.simulation.stats.frame_ticks,
            time_secs: now.as_secs_f64(),
            entities: self.simulation.snapshot(),
        };
        self.snapshot_tx.send_replace(Arc::new(frame));
    }

    /// Sleeps until each deadline and pumps, until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Simulation {
        info!(
            admission_ms = self.admission_interval.as_millis() as u64,
            frame_us = self.frame_interval.as_micros() as u64,
            "simulation clock started"
        );

        loop {
            if shutdown::is_triggered(&shutdown) {
                break;
            }
            let wait = self.next_deadline().saturating_sub(self.context.now());

            let stop = tokio::select! {
                _ = self.context.sleep(wait) => false,
                _ = shutdown::triggered(&mut shutdown) => true,
            };
            if stop {
                break;
            }
            self.pump();
            tokio::task::yield_now().await;
        }

        let stats = &self.simulation.stats;
        info!(
            admission_ticks = stats.admission_ticks,
            frame_ticks = stats.frame_ticks,
            admitted = stats.admitted,
            expired = stats.expired,
            live = self.simulation.pool.len(),
            "simulation clock stopped"
        );
        self.simulation
    }

    /// Spawns the driver task on the context.
    pub fn start(self) -> ClockHandle {
        let (trigger, signal) = shutdown::channel();
        let (result_tx, result_rx) = oneshot::channel();
        let snapshots = self.subscribe();
        let context = Arc::clone(&self.context);

        let task = context.spawn("simulation-clock", async move {
            let simulation = self.run(signal).await;
            let _ = result_tx.send(simulation);
        });

        ClockHandle {
            trigger,
            task,
            result: result_rx,
            snapshots,
        }
    }
}

/// First deadline on the `interval` grid strictly after `now`.
fn next_after(deadline: Duration, interval: Duration, now: Duration) -> Duration {
    let mut next = deadline + interval;
    while next <= now {
        next += interval;
    }
    next
}

/// Controls a running [`SimulationClock`].
pub struct ClockHandle {
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
    result: oneshot::Receiver<Simulation>,
    snapshots: SnapshotReceiver,
}

impl ClockHandle {
    /// A new receiver of published frames.
    pub fn snapshots(&self) -> SnapshotReceiver {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops both cadences and returns the final simulation state.
    ///
    /// A panic inside the driver (an invariant violation) is re-raised here.
    pub async fn stop(self) -> Result<Simulation, SimulationError> {
        let _ = self.trigger.send(true);

        if let Err(err) = self.task.await {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
            return Err(SimulationError::DriverLost);
        }
        self.result.await.map_err(|_| SimulationError::DriverLost)
    }
}
