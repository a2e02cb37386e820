//! dronewatch Simulator CLI
//!
//! Run deterministic feed scenarios against the ingestion pipeline, or replay
//! a recorded feed through the real telemetry engine.

use clap::Parser;
use dronewatch_core::TrackerConfig;
use dronewatch_sim::scenarios::ScenarioId;
use dronewatch_sim::{replay_file, ScenarioResult, ScenarioRunner, SimError};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// dronewatch deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "dronewatch-sim")]
#[command(about = "Run deterministic feed simulations for dronewatch", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of simulated drones
    #[arg(short = 'n', long, default_value = "20")]
    drones: usize,

    /// Scenario to run (steady_fleet, handoff_storm, duplicate_flood, anonymous_drift, burst_delivery, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Emission span in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames and final map layers to a JSON file (single scenario)
    #[arg(long)]
    export: Option<String>,

    /// Replay an NDJSON recording through the engine instead of simulating
    #[arg(long)]
    replay: Option<String>,

    /// Tracker configuration file (JSON)
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging (RUST_LOG wins over --verbose)
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SimError> {
    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    if let Some(path) = &args.replay {
        return replay(path, config);
    }

    if !args.json {
        info!("dronewatch Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(SimError::Setup)?]
    };

    // Determine base seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner = ScenarioRunner::new(seed, args.drones)
        .with_duration(args.duration)
        .with_config(config);

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::Setup(
                "--export only supports a single scenario, not 'all'".to_string(),
            ));
        }

        let (result, export) = runner.run_with_export(scenarios[0])?;
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        report(&[result], args.json)?;
        return Ok(());
    }

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        if !args.json {
            info!("▶ {}: {}", scenario.name(), scenario.description());
        }
        results.push(runner.run(*scenario)?);
    }

    report(&results, args.json)
}

/// Print the outcome and fail the process if anything failed.
fn report(results: &[ScenarioResult], json: bool) -> Result<(), SimError> {
    let total = results.len();
    let failed_count = results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for result in results {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED | tracks={} merges={} handoffs={}",
                    result.scenario.name(),
                    result.seed,
                    result.final_track_count,
                    result.metrics.merges,
                    result.metrics.handoffs
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason().unwrap_or_default()
                );
            }
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn replay(path: &str, config: TrackerConfig) -> Result<(), SimError> {
    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(replay_file(path, config))?;

    let counters = summary.snapshot.counters();
    info!(
        "Replayed {} envelopes: {} tracks ({} allowed, {} blocked), {} merges, {} rejected",
        summary.envelopes,
        counters.total,
        counters.green,
        counters.red,
        summary.stats.flushes,
        summary.stats.envelopes_rejected
    );
    Ok(())
}
