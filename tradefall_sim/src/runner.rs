//! Scenario runner - drives the pipeline through scripted feed scenarios.

use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::generator::{GeneratorConfig, MessageKind, TradeGenerator};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorldOutcome};

use serde::Serialize;
use std::time::Duration;
use tradefall_core::{FeedStatsSnapshot, LifecycleMonitor, TradefallConfig};
use tradefall_env::TradefallContext;
use tracing::{debug, info, warn};

/// RNG stream of the synthetic trade generator.
const GENERATOR_STREAM: u64 = 1;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    #[serde(serialize_with = "serialize_scenario")]
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of live particles at end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

fn serialize_scenario<S: serde::Serializer>(id: &ScenarioId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(id.name())
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Messages the feed accepted, by kind
    pub trades_sent: u64,
    pub noise_sent: u64,
    pub malformed_sent: u64,

    /// Messages generated while disconnected
    pub frames_rejected: u64,

    /// Connection drops injected
    pub disconnects: u32,

    pub admitted: u64,
    pub expired: u64,
    pub admission_ticks: u64,
    pub frame_ticks: u64,
    pub largest_batch: usize,
    pub peak_live: usize,

    pub feed: FeedStatsSnapshot,
}

/// A finished run plus its sampled frames.
pub struct ScenarioRun {
    pub result: ScenarioResult,
    pub export: SimExport,
}

/// Runs feed scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Requested duration in seconds
    max_duration_secs: f64,

    /// Pipeline settings
    pipeline: TradefallConfig,

    /// Sample a frame for export this often
    export_every: Option<Duration>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 10.0,
            pipeline: SimConfig::default().pipeline,
            export_every: None,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Replaces the pipeline configuration.
    pub fn with_pipeline(mut self, pipeline: TradefallConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Samples frames for export at the given interval.
    pub fn with_export_every(mut self, interval: Duration) -> Self {
        self.export_every = Some(interval);
        self
    }

    /// Runs a scenario on a fresh single-threaded runtime.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioRun, SimError> {
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        runtime.block_on(self.run_async(scenario))
    }

    /// Runs a scenario on the current runtime.
    pub async fn run_async(&self, scenario: ScenarioId) -> Result<ScenarioRun, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let plan = scenario.plan();
        let requested = Duration::from_secs_f64(self.max_duration_secs.max(0.0));
        let duration = requested.max(scenario.min_duration());

        let mut world = SimWorld::new(SimConfig {
            seed: self.seed,
            step: Duration::from_millis(1),
            pipeline: self.pipeline.clone(),
        })?;
        let step = world.config.step;
        let total_steps = (duration.as_nanos() / step.as_nanos()) as u64;

        let mut generator = TradeGenerator::new(
            GeneratorConfig {
                symbol: self.pipeline.feed.symbol.to_uppercase(),
                noise_rate: plan.noise_rate,
                malformed_rate: plan.malformed_rate,
                ..GeneratorConfig::default()
            },
            world.context.rng_for(GENERATOR_STREAM),
        );

        let mut metrics = ScenarioMetrics::default();
        let mut export = SimExport::new(scenario.name(), self.seed);
        let stall_step = plan
            .stall
            .map(|(fraction, length)| ((total_steps as f64 * fraction) as u64, length));
        let mut next_drop = plan.disconnect_every;
        let mut next_sample = Duration::ZERO;
        let mut pending_events: Vec<String> = Vec::new();

        world.start().await;

        for tick in 0..total_steps {
            let now = world.context.now();

            if let (Some(at), Some(every)) = (next_drop, plan.disconnect_every) {
                if now >= at {
                    if world.feed.is_connected() {
                        world.feed.drop_connection();
                        world.feed.refuse_connections(plan.refuse_after_drop);
                        metrics.disconnects += 1;
                        pending_events.push("feed connection dropped".to_string());
                        debug!(t = now.as_secs_f64(), "dropped feed connection");
                    }
                    next_drop = Some(at + every);
                }
            }

            let arrivals = generator.arrivals(plan.rate_at(now), step.as_secs_f64());
            for _ in 0..arrivals {
                let message = generator.next_message(now.as_millis() as u64);
                if !world.feed.push(message.text) {
                    metrics.frames_rejected += 1;
                    continue;
                }
                match message.kind {
                    MessageKind::Trade => metrics.trades_sent += 1,
                    MessageKind::Noise => metrics.noise_sent += 1,
                    MessageKind::Malformed => metrics.malformed_sent += 1,
                }
            }

            match stall_step {
                Some((at, length)) if at == tick => {
                    world.stall(length).await;
                    pending_events.push(format!("clock stalled for {:?}", length));
                }
                _ => world.step().await,
            }

            if let Some(every) = self.export_every {
                if world.context.now() >= next_sample {
                    let mut frame = SimFrame::from_snapshot(&world.latest_frame());
                    for event in pending_events.drain(..) {
                        frame = frame.with_event(event, Some("warn"));
                    }
                    export.add_frame(frame);
                    next_sample = world.context.now() + every;
                }
            }

            if tick % 1_000 == 0 {
                debug!(
                    "  t={:.1}s | live={} | queued={}",
                    world.time(),
                    world.latest_frame().entities.len(),
                    world.queue().len()
                );
            }
        }

        let next_id = world.next_id();
        let outcome = world.finish().await?;
        let failure = self.check(scenario, &plan_stall(&plan), &outcome, &mut metrics, next_id);
        let passed = failure.is_none();

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: outcome.final_time.as_secs_f64(),
            final_entity_count: outcome.simulation.pool().len(),
            failure_reason: failure,
            metrics,
        };

        if passed {
            info!(
                "✓ {} complete: {} admitted, {} expired, {} live",
                scenario.name(),
                result.metrics.admitted,
                result.metrics.expired,
                result.final_entity_count
            );
        } else {
            warn!(
                "✗ {} failed: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        export.finalize(result.passed, result.failure_reason.clone());
        Ok(ScenarioRun { result, export })
    }

    /// Checks pipeline invariants on the final state. Returns the first violation.
    fn check(
        &self,
        scenario: ScenarioId,
        stall: &Option<Duration>,
        outcome: &WorldOutcome,
        metrics: &mut ScenarioMetrics,
        next_id: u64,
    ) -> Option<String> {
        let sim = &outcome.simulation;
        let stats = sim.stats();
        metrics.admitted = stats.admitted;
        metrics.expired = stats.expired;
        metrics.admission_ticks = stats.admission_ticks;
        metrics.frame_ticks = stats.frame_ticks;
        metrics.largest_batch = stats.largest_batch;
        metrics.peak_live = stats.peak_live;

        let feed = match &outcome.feed {
            Ok(feed) => *feed,
            Err(e) => return Some(format!("feed listener failed: {}", e)),
        };
        metrics.feed = feed;

        // Every accepted message was read and classified as generated
        if feed.trades != metrics.trades_sent {
            return Some(format!("{} trades sent, {} decoded", metrics.trades_sent, feed.trades));
        }
        if feed.skipped != metrics.noise_sent {
            return Some(format!("{} noise sent, {} skipped", metrics.noise_sent, feed.skipped));
        }
        if feed.decode_errors != metrics.malformed_sent {
            return Some(format!(
                "{} malformed sent, {} decode errors",
                metrics.malformed_sent, feed.decode_errors
            ));
        }

        // Every decoded trade was admitted exactly once
        if stats.admitted != feed.trades {
            return Some(format!("{} trades decoded, {} admitted", feed.trades, stats.admitted));
        }
        if next_id != self.pipeline.decoder.first_id + feed.trades {
            return Some(format!("id counter at {} after {} trades", next_id, feed.trades));
        }
        let live = sim.pool().len() as u64;
        if stats.admitted - stats.expired != live {
            return Some(format!(
                "admitted {} - expired {} != live {}",
                stats.admitted, stats.expired, live
            ));
        }

        // Live particles are unique, in range and above the floor once stepped
        let size = &self.pipeline.spawn.size;
        let monitor = LifecycleMonitor::new(&self.pipeline.lifecycle);
        let snapshot = sim.snapshot();
        if snapshot.windows(2).any(|w| w[0].id >= w[1].id) {
            return Some("snapshot ids not strictly increasing".to_string());
        }
        for particle in &snapshot {
            if particle.id.as_u64() >= next_id {
                return Some(format!("{} was never issued", particle.id));
            }
            if particle.size < size.min_size || particle.size > size.max_size {
                return Some(format!("{} has size {} out of range", particle.id, particle.size));
            }
            if !particle.position.iter().all(|c| c.is_finite()) {
                return Some(format!("{} has a non-finite position", particle.id));
            }
            if let Some(entity) = sim.pool().get(particle.id) {
                if monitor.is_expired(entity) {
                    return Some(format!("{} survived below the floor", particle.id));
                }
            }
        }

        // Cadence: one tick per interval, minus whatever a stall swallowed
        let elapsed = outcome.final_time.as_nanos();
        let admission = self.pipeline.clock.admission_interval().as_nanos();
        let frame = self.pipeline.clock.frame_interval().as_nanos();
        let expected_admissions = (elapsed / admission) as u64;
        let frame_hz = u128::from(self.pipeline.clock.frame_rate_hz.max(1));
        let expected_frames = (elapsed * frame_hz / 1_000_000_000) as u64;
        match stall {
            None => {
                if stats.admission_ticks.abs_diff(expected_admissions) > 1 {
                    return Some(format!(
                        "{} admission ticks, expected {}",
                        stats.admission_ticks, expected_admissions
                    ));
                }
                if stats.frame_ticks.abs_diff(expected_frames) > 1 {
                    return Some(format!(
                        "{} frame ticks, expected {}",
                        stats.frame_ticks, expected_frames
                    ));
                }
            }
            Some(length) => {
                let swallowed = (length.as_nanos() / frame) as u64;
                if stats.frame_ticks + swallowed > expected_frames + 1 {
                    return Some(format!(
                        "{} frame ticks despite a {:?} stall (expected at most {})",
                        stats.frame_ticks,
                        length,
                        expected_frames.saturating_sub(swallowed) + 1
                    ));
                }
            }
        }

        match scenario {
            ScenarioId::Burst if stats.largest_batch < 20 => Some(format!(
                "burst never produced a large batch (largest {})",
                stats.largest_batch
            )),
            ScenarioId::Drought if live != 0 => {
                Some(format!("{} particles still live after the drought", live))
            }
            ScenarioId::FeedChaos => {
                if metrics.disconnects == 0 {
                    return Some("no disconnects were injected".to_string());
                }
                if feed.connections < u64::from(metrics.disconnects) {
                    return Some(format!(
                        "{} connections after {} drops",
                        feed.connections, metrics.disconnects
                    ));
                }
                if feed.decode_errors == 0 && metrics.malformed_sent > 0 {
                    return Some("malformed messages went unnoticed".to_string());
                }
                None
            }
            _ => None,
        }
    }
}

fn plan_stall(plan: &crate::scenarios::ScenarioPlan) -> Option<Duration> {
    plan.stall.map(|(_, length)| length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_stream_scenario() {
        let run = ScenarioRunner::new(42).with_duration(2.0).run(ScenarioId::SteadyStream).unwrap();

        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert!(run.result.metrics.trades_sent > 0);
        assert_eq!(run.result.metrics.admitted, run.result.metrics.trades_sent);
    }

    #[test]
    fn test_burst_scenario() {
        let run = ScenarioRunner::new(42).with_duration(1.5).run(ScenarioId::Burst).unwrap();

        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert!(run.result.metrics.largest_batch >= 20);
        assert!(run.result.metrics.peak_live > 1_000);
    }

    #[test]
    fn test_drought_empties_pool() {
        let run = ScenarioRunner::new(7).run(ScenarioId::Drought).unwrap();

        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert_eq!(run.result.final_entity_count, 0);
        assert_eq!(run.result.metrics.expired, run.result.metrics.admitted);
    }

    #[test]
    fn test_feed_chaos_scenario() {
        let run = ScenarioRunner::new(42).with_duration(5.0).run(ScenarioId::FeedChaos).unwrap();

        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert!(run.result.metrics.disconnects >= 2);
        assert!(run.result.metrics.feed.reconnect_attempts >= 2);
        assert!(run.result.metrics.frames_rejected > 0);
    }

    #[test]
    fn test_stall_scenario() {
        let run = ScenarioRunner::new(42).with_duration(2.0).run(ScenarioId::Stall).unwrap();

        assert!(run.result.passed, "{:?}", run.result.failure_reason);
        assert!(run.result.final_time_secs > 5.0);
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = ScenarioRunner::new(9).with_duration(1.0).run(ScenarioId::SteadyStream).unwrap();
        let b = ScenarioRunner::new(9).with_duration(1.0).run(ScenarioId::SteadyStream).unwrap();

        assert_eq!(a.result.metrics.trades_sent, b.result.metrics.trades_sent);
        assert_eq!(a.result.metrics.admitted, b.result.metrics.admitted);
        assert_eq!(a.result.final_entity_count, b.result.final_entity_count);
    }

    #[test]
    fn test_export_samples_frames() {
        let run = ScenarioRunner::new(42)
            .with_duration(1.0)
            .with_export_every(Duration::from_millis(100))
            .run(ScenarioId::SteadyStream)
            .unwrap();

        assert!(run.export.frames.len() >= 9);
        assert!(run.export.passed);
    }
}
