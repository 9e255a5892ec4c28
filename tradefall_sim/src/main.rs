//! Tradefall CLI
//!
//! Watch a live trade feed fall as particles, or run deterministic scenarios.

use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tradefall_core::shutdown;
use tradefall_core::{
    AdmissionQueue, EventDecoder, FeedListener, IdGenerator, Simulation, SimulationClock,
    TradefallConfig,
};
use tradefall_env::{Endpoint, TokioContext, WsTransport};
use tradefall_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimConfig, SimError, SimExport, SimFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Connect to the exchange feed
    Live,
    /// Run scripted scenarios under a virtual clock
    Sim,
}

/// Tradefall: market trades as falling particles
#[derive(Parser, Debug)]
#[command(name = "tradefall")]
#[command(about = "Turn a live trade feed into a particle simulation", long_about = None)]
struct Args {
    /// Live feed or deterministic simulation
    #[arg(short, long, value_enum, default_value = "sim")]
    mode: Mode,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run (sim mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Scenario to run (steady_stream, burst, drought, feed_chaos, stall, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run length in seconds (0 = until Ctrl-C in live mode)
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Instrument symbol, e.g. btcusdt
    #[arg(long)]
    symbol: Option<String>,

    /// JSON file with pipeline settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export sampled frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Sampling interval for --export, in milliseconds
    #[arg(long, default_value = "100")]
    export_interval_ms: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let outcome = match args.mode {
        Mode::Live => run_live(&args),
        Mode::Sim => run_sim(&args),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Loads pipeline settings, applying CLI overrides.
fn load_config(path: Option<&Path>, base: TradefallConfig, symbol: Option<&str>) -> Result<TradefallConfig, SimError> {
    let mut config = match path {
        Some(path) => TradefallConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => base,
    };
    if let Some(symbol) = symbol {
        config.feed.symbol = symbol.to_lowercase();
    }
    config.validate()?;
    Ok(config)
}

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

fn run_live(args: &Args) -> Result<bool, SimError> {
    let config = load_config(args.config.as_deref(), TradefallConfig::default(), args.symbol.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(live(args, config))
}

async fn live(args: &Args, config: TradefallConfig) -> Result<bool, SimError> {
    info!("Tradefall v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let endpoint = Endpoint::parse(&config.feed.endpoint)?;
    info!(endpoint = %endpoint, symbol = %config.feed.symbol, "Connecting to trade feed");

    let context = TokioContext::shared();
    let queue = AdmissionQueue::new();
    let ids = Arc::new(IdGenerator::starting_at(config.decoder.first_id));
    let listener = FeedListener::new(
        Arc::clone(&context),
        WsTransport::new(endpoint),
        EventDecoder::new(&config.decoder, ids),
        queue.clone(),
        &config.feed,
    );
    let feed_stats = listener.stats();
    let (feed_trigger, feed_signal) = shutdown::channel();
    let mut feed_task = tokio::spawn(listener.run(feed_signal));

    let clock = SimulationClock::new(Arc::clone(&context), &config.clock, Simulation::new(&config, queue)).start();
    let frames = clock.snapshots();

    let mut export = args.export.as_ref().map(|_| SimExport::new("live", args.seed));
    let sample_every = Duration::from_millis(args.export_interval_ms.max(1));
    let mut sample = tokio::time::interval(sample_every);
    let mut report = tokio::time::interval(Duration::from_secs(1));

    let run_for = args.duration;
    let until = async move {
        if run_for > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(run_for)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(until);

    let mut feed_result = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = &mut until => break,
            joined = &mut feed_task => {
                feed_result = Some(joined.map_err(|_| SimError::TaskLost("feed listener"))?);
                break;
            }
            _ = report.tick() => {
                let frame = frames.borrow().clone();
                let feed = feed_stats.snapshot();
                info!(
                    "t={:.1}s | live={} | trades={} | skipped={} | errors={}",
                    frame.time_secs,
                    frame.entities.len(),
                    feed.trades,
                    feed.skipped,
                    feed.decode_errors
                );
            }
            _ = sample.tick(), if export.is_some() => {
                if let Some(export) = export.as_mut() {
                    export.add_frame(SimFrame::from_snapshot(&frames.borrow().clone()));
                }
            }
        }
    }

    let _ = feed_trigger.send(true);
    let feed = match feed_result {
        Some(result) => result,
        None => feed_task.await.map_err(|_| SimError::TaskLost("feed listener"))?,
    };
    let simulation = clock.stop().await?;

    let stats = simulation.stats();
    info!(
        "Admitted {} | expired {} | live {} | admission ticks {} | frames {}",
        stats.admitted,
        stats.expired,
        simulation.pool().len(),
        stats.admission_ticks,
        stats.frame_ticks
    );

    let passed = match &feed {
        Ok(feed) => {
            debug!(?feed, "feed totals");
            true
        }
        Err(e) => {
            error!("Feed listener gave up: {}", e);
            false
        }
    };

    if let (Some(path), Some(mut export)) = (&args.export, export) {
        export.finalize(passed, feed.err().map(|e| e.to_string()));
        export.write_to_file(path)?;
        info!("Exported {} frames to {}", export.frames.len(), path.display());
    }
    Ok(passed)
}

fn run_sim(args: &Args) -> Result<bool, SimError> {
    let pipeline = load_config(args.config.as_deref(), SimConfig::default().pipeline, args.symbol.as_deref())?;

    if !args.json {
        info!("Tradefall DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                error!("{}", e);
                error!("Available scenarios: steady_stream, burst, drought, feed_chaos, stall, all");
                return Ok(false);
            }
        }
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        error!("--export only supports a single scenario and seed");
        return Ok(false);
    }

    let base_seed = base_seed(args.seed);
    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let mut runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_pipeline(pipeline.clone());
        if args.export.is_some() {
            runner = runner.with_export_every(Duration::from_millis(args.export_interval_ms.max(1)));
        }

        for scenario in &scenarios {
            let run = runner.run(*scenario)?;

            if !args.json {
                if run.result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        run.result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if let Some(path) = &args.export {
                run.export.write_to_file(path)?;
                info!("Exported {} frames to {}", run.export.frames.len(), path.display());
            }
            all_results.push(run.result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            warn!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed.is_empty())
}
