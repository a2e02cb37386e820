//! Scenario runner - drives the ingestion pipeline on virtual time.
//!
//! Each run wires oracle → arrival timeline → `Coalescer` → `TrackStore`
//! exactly the way the telemetry engine does, except that the clock is the
//! `SimContext` and deadlines fire in timeline order. Afterwards the final
//! snapshot is checked against the oracle's ground truth.

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::oracle::FleetOracle;
use crate::scenarios::{ScenarioId, ScenarioProfile};

use dronewatch_core::{
    feature_layers, Coalescer, DroneUpdate, FleetCounters, FleetSnapshot, IngestStats,
    TrackStore, TrackerConfig, UpdateBatch, ViewFilter,
};
use dronewatch_env::TrackerContext;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RNG stream for kinematics and feed events.
const PHYSICS_STREAM: u64 = 1;

/// RNG stream for delivery timing.
const TIMELINE_STREAM: u64 = 2;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Virtual time of the last delivery or merge (ms)
    pub sim_time_ms: u64,

    /// Tracks in the final snapshot
    pub final_track_count: usize,

    /// Every violated invariant
    pub failures: Vec<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    /// All failures on one line, if any.
    pub fn failure_reason(&self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Updates produced by the oracle, duplicates included
    pub updates_emitted: u64,

    /// Batches handed to the coalescer
    pub batches_delivered: u64,

    /// Merge passes run by the store
    pub merges: u64,

    /// Whole flush windows in the simulated span
    pub windows_elapsed: u64,

    pub handoffs: u64,
    pub duplicates_emitted: u64,
    pub anonymous_drones: usize,

    /// Version of the final snapshot
    pub final_version: u64,

    pub counters: FleetCounters,
    pub ingest: IngestStats,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of simulated drones
    num_drones: usize,

    /// Emission span in seconds
    max_duration_secs: f64,

    /// Tracker configuration under test
    config: TrackerConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_drones: usize) -> Self {
        Self {
            seed,
            num_drones,
            max_duration_secs: 10.0,
            config: TrackerConfig::default(),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the tracker configuration. The ingest gate is always opened.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let (result, _) = self.execute(scenario)?;
        Ok(result)
    }

    /// Runs a scenario and also returns its frame-by-frame export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), SimError> {
        self.execute(scenario)
    }

    fn execute(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), SimError> {
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(SimError::Setup(format!(
                "duration must be positive, got {}",
                self.max_duration_secs
            )));
        }
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let profile = scenario.profile();
        let ctx = SimContext::new(self.seed);

        let mut oracle = FleetOracle::from_rng(ctx.rng_stream(PHYSICS_STREAM));
        oracle.set_handoff_probability(profile.handoff_probability);
        oracle.set_duplicate_probability(profile.duplicate_probability);
        let anonymous = (self.num_drones as f64 * profile.anonymous_fraction).round() as usize;
        oracle.spawn_fleet(self.num_drones, anonymous);

        let mut config = self.config.clone();
        config.ingest_enabled_at_start = true;
        let mut pipeline = Pipeline::new(ctx.clone(), config)?;
        let mut timeline = Timeline::new(ctx.rng_stream(TIMELINE_STREAM), profile);

        let mut metrics = ScenarioMetrics {
            anonymous_drones: anonymous,
            ..Default::default()
        };

        let tick = Duration::from_millis(profile.tick_ms.max(1));
        let ticks = (self.max_duration_secs * 1000.0 / tick.as_millis() as f64).ceil() as u64;

        for t in 0..ticks {
            if t > 0 {
                oracle.step(tick.as_secs_f64());
            }
            let updates = oracle.emit();
            metrics.updates_emitted += updates.len() as u64;

            let emitted_at = tick * t as u32;
            for (arrival, batch) in timeline.schedule(emitted_at, updates) {
                pipeline.deliver(arrival, batch);
                metrics.batches_delivered += 1;
            }

            if t % 10 == 0 {
                debug!(
                    "  t={:.1}s | drones={} | tracks={}",
                    oracle.time(),
                    oracle.drones().len(),
                    pipeline.store.snapshot().len()
                );
            }
        }
        pipeline.finish();

        let snapshot = pipeline.store.snapshot();
        let window_ms = pipeline.coalescer.window().as_millis().max(1) as u64;
        let sim_time_ms = pipeline.ctx.now().as_millis() as u64;

        metrics.merges = pipeline.stats.flushes;
        metrics.windows_elapsed = sim_time_ms / window_ms;
        metrics.handoffs = oracle.total_handoffs();
        metrics.duplicates_emitted = oracle.duplicates_emitted();
        metrics.final_version = snapshot.version();
        metrics.counters = snapshot.counters();
        metrics.ingest = pipeline.stats;

        let match_radius_m = pipeline.store.config().match_radius_m;
        let failures = check_invariants(&oracle, &snapshot, &metrics, match_radius_m);
        let passed = failures.is_empty();
        if !passed {
            for failure in &failures {
                warn!("{}: {}", scenario.name(), failure);
            }
        }

        let mut export = SimExport::new(scenario.name(), self.seed);
        for frame in pipeline.frames {
            export.add_frame(frame);
        }
        export.finalize(passed, failures.clone(), feature_layers(&snapshot, ViewFilter::All));

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            sim_time_ms,
            final_track_count: snapshot.len(),
            failures,
            metrics,
        };
        Ok((result, export))
    }
}

// ============================================================================
// DELIVERY TIMELINE
// ============================================================================

/// Turns emissions into (arrival time, batch) pairs.
///
/// Arrival times never decrease, so each drone's updates reach the
/// coalescer in emission order.
struct Timeline {
    rng: ChaCha8Rng,
    profile: ScenarioProfile,
    last_arrival: Duration,
}

impl Timeline {
    fn new(rng: ChaCha8Rng, profile: ScenarioProfile) -> Self {
        Self {
            rng,
            profile,
            last_arrival: Duration::ZERO,
        }
    }

    fn schedule(&mut self, emitted_at: Duration, updates: Vec<DroneUpdate>) -> Vec<(Duration, UpdateBatch)> {
        let stall = if self.rng.gen_bool(self.profile.stall_probability.clamp(0.0, 1.0)) {
            Duration::from_millis(self.profile.stall_ms)
        } else {
            Duration::ZERO
        };

        let parts = self.profile.sub_batches.max(1);
        let chunk = ((updates.len() + parts - 1) / parts).max(1);

        let mut out = Vec::with_capacity(parts);
        for features in updates.chunks(chunk) {
            let jitter = Duration::from_millis(self.rng.gen_range(0..=self.profile.arrival_jitter_ms));
            let arrival = (emitted_at + stall + jitter).max(self.last_arrival);
            self.last_arrival = arrival;
            out.push((arrival, UpdateBatch::new(features.to_vec())));
        }
        out
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Coalescer and store on the virtual clock.
struct Pipeline {
    ctx: SimContext,
    store: TrackStore,
    coalescer: Coalescer,
    stats: IngestStats,
    frames: Vec<SimFrame>,
}

impl Pipeline {
    fn new(ctx: SimContext, config: TrackerConfig) -> Result<Self, SimError> {
        let coalescer = Coalescer::new(config.flush_window());
        let store = TrackStore::new(config)?;
        Ok(Self {
            ctx,
            store,
            coalescer,
            stats: IngestStats::default(),
            frames: Vec::new(),
        })
    }

    /// Fire every deadline up to `arrival`, then buffer the batch.
    fn deliver(&mut self, arrival: Duration, batch: UpdateBatch) {
        self.fire_due(arrival);
        self.ctx.set_time(arrival.as_nanos() as u64);
        self.stats.batches_received += 1;
        self.coalescer.push(batch, self.ctx.now());
    }

    fn fire_due(&mut self, until: Duration) {
        while let Some(deadline) = self.coalescer.deadline() {
            if deadline > until {
                break;
            }
            self.ctx.set_time(deadline.as_nanos() as u64);
            self.flush();
        }
    }

    /// Let the last window close.
    fn finish(&mut self) {
        if let Some(deadline) = self.coalescer.deadline() {
            self.fire_due(deadline);
        }
    }

    fn flush(&mut self) {
        let updates = match self.coalescer.take() {
            Some(updates) => updates,
            None => return,
        };
        let report = self.store.apply_batch(&updates, self.ctx.unix_millis());
        self.stats.record(&report);
        self.frames.push(SimFrame {
            time_ms: self.ctx.now().as_millis() as u64,
            version: report.version,
            counters: self.store.counters(),
            report,
        });
    }
}

// ============================================================================
// INVARIANTS
// ============================================================================

/// Compare the final snapshot against ground truth.
fn check_invariants(
    oracle: &FleetOracle,
    snapshot: &FleetSnapshot,
    metrics: &ScenarioMetrics,
    match_radius_m: f64,
) -> Vec<String> {
    let mut failures = Vec::new();

    if snapshot.len() != oracle.drones().len() {
        failures.push(format!(
            "expected {} tracks, found {}",
            oracle.drones().len(),
            snapshot.len()
        ));
    }

    for track in snapshot.iter() {
        let concatenated: Vec<_> = track.segments().iter().flat_map(|s| s.0.iter().copied()).collect();
        if concatenated != track.flattened_path().0 {
            failures.push(format!("{}: flattened path differs from its segments", track.id()));
        }
        for segment in track.segments() {
            if segment.0.windows(2).any(|w| w[0] == w[1]) {
                failures.push(format!("{}: repeated consecutive point", track.id()));
                break;
            }
        }
    }

    let mut anonymous_keys = BTreeSet::new();
    for drone in oracle.drones() {
        match &drone.registration {
            Some(registration) => match snapshot.get(registration) {
                Some(track) => {
                    if track.segment_count() != drone.expected_segments() {
                        failures.push(format!(
                            "{}: {} segments, expected {}",
                            registration,
                            track.segment_count(),
                            drone.expected_segments()
                        ));
                    }
                    if track.current_transport_id != drone.serial {
                        failures.push(format!("{}: stale transport id", registration));
                    }
                }
                None => failures.push(format!("{}: no track", registration)),
            },
            None => {
                let found = drone
                    .last_emitted
                    .and_then(|point| snapshot.nearest(&point, match_radius_m));
                match found {
                    Some((key, _)) => {
                        let attached_to_registered = oracle
                            .drones()
                            .iter()
                            .any(|d| d.registration.as_deref() == Some(key.as_str()));
                        if attached_to_registered {
                            failures.push(format!("anonymous drone {} merged into {}", drone.id, key));
                        }
                        anonymous_keys.insert(key);
                    }
                    None => failures.push(format!("anonymous drone {}: no track nearby", drone.id)),
                }
            }
        }
    }
    if anonymous_keys.len() != oracle.anonymous_count() {
        failures.push(format!(
            "{} anonymous drones share {} tracks",
            oracle.anonymous_count(),
            anonymous_keys.len()
        ));
    }

    if metrics.merges > metrics.windows_elapsed {
        failures.push(format!(
            "{} merges in {} windows",
            metrics.merges, metrics.windows_elapsed
        ));
    }
    if metrics.final_version != metrics.merges {
        failures.push(format!(
            "version {} after {} merges",
            metrics.final_version, metrics.merges
        ));
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_all_scenarios_pass() {
        let runner = ScenarioRunner::new(42, 8).with_duration(3.0);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).unwrap();
            assert!(result.passed, "{}: {:?}", scenario, result.failures);
            assert_eq!(result.final_track_count, 8);
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let runner = ScenarioRunner::new(7, 6).with_duration(2.0);
        let a = runner.run(ScenarioId::HandoffStorm).unwrap();
        let b = runner.run(ScenarioId::HandoffStorm).unwrap();
        assert_eq!(a.metrics.handoffs, b.metrics.handoffs);
        assert_eq!(a.metrics.merges, b.metrics.merges);
        assert_eq!(a.sim_time_ms, b.sim_time_ms);
    }

    #[test]
    fn test_burst_delivery_coalesces() {
        let runner = ScenarioRunner::new(3, 10).with_duration(2.0);
        let result = runner.run(ScenarioId::BurstDelivery).unwrap();
        // five sub-batches per tick, far fewer merges than deliveries
        assert!(result.metrics.merges * 5 <= result.metrics.batches_delivered);
        assert!(result.metrics.merges <= result.metrics.windows_elapsed);
    }

    #[test]
    fn test_export_has_one_frame_per_merge() {
        let runner = ScenarioRunner::new(1, 4).with_duration(1.0);
        let (result, export) = runner.run_with_export(ScenarioId::SteadyFleet).unwrap();
        assert_eq!(export.frames.len() as u64, result.metrics.merges);
        assert_eq!(export.final_layers.unwrap().point_count(), 4);
        assert!(export.passed);
    }

    #[test]
    fn test_rejects_bad_duration() {
        let runner = ScenarioRunner::new(1, 4).with_duration(0.0);
        assert!(matches!(runner.run(ScenarioId::SteadyFleet), Err(SimError::Setup(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_handoff_storm_holds_for_any_seed(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed, 5)
                .with_duration(1.0)
                .run(ScenarioId::HandoffStorm)
                .unwrap();
            prop_assert!(result.passed, "{:?}", result.failures);
        }
    }
}
