//! JSON exporter for simulation runs.
//!
//! One frame per merge, plus the final map layers, so a run can be replayed
//! or plotted outside the harness.

use crate::error::SimError;
use dronewatch_core::{BatchReport, FeatureLayers, FleetCounters};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// State of the fleet right after one merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Virtual time of the merge (ms since simulation start)
    pub time_ms: u64,

    /// Snapshot version published by the merge
    pub version: u64,

    pub counters: FleetCounters,

    /// What the merge did
    pub report: BatchReport,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual time of the last frame in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,

    /// Render layers of the final snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_layers: Option<FeatureLayers>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failures: Vec::new(),
            final_layers: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_ms as f64 / 1000.0;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failures: Vec<String>, layers: FeatureLayers) {
        self.passed = passed;
        self.failures = failures;
        self.final_layers = Some(layers);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
