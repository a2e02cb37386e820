//! dronewatch Metrics Module
//! =========================
//!
//! - **Fleet counters**: total / red (blocked) / green (allowed), recomputed
//!   from a snapshot on demand
//! - **Batch report**: what one `apply_batch` did
//! - **Ingest stats**: running totals kept by the telemetry engine

use crate::track::{DroneTrack, PathEffect};
use serde::{Deserialize, Serialize};

// =============================================================================
// FLEET COUNTERS
// =============================================================================

/// Compliance counts over a set of tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetCounters {
    pub total: usize,
    /// Blocked tracks
    pub red: usize,
    /// Allowed tracks
    pub green: usize,
}

impl FleetCounters {
    /// Count a set of tracks by compliance.
    pub fn from_tracks<'a, I>(tracks: I) -> Self
    where
        I: IntoIterator<Item = &'a DroneTrack>,
    {
        let mut total = 0;
        let mut red = 0;
        for track in tracks {
            total += 1;
            if !track.is_allowed() {
                red += 1;
            }
        }

        Self {
            total,
            red,
            green: total - red,
        }
    }
}

// =============================================================================
// BATCH REPORT
// =============================================================================

/// Outcome of one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Updates handed to the merge
    pub received: usize,
    /// New tracks created
    pub created: usize,
    /// Updates merged into existing tracks
    pub updated: usize,
    /// Updates without a derivable identity
    pub dropped: usize,
    /// Segments started by transport handoffs
    pub new_segments: usize,
    /// Points appended to current segments
    pub appended_points: usize,
    /// Points equal to the last one and therefore skipped
    pub duplicate_points: usize,
    /// Whole batch ignored because ingestion was disabled
    pub gated: bool,
    /// Snapshot version published by this pass (unchanged when gated)
    pub version: u64,
}

impl BatchReport {
    /// Report for a batch skipped by the ingest gate.
    pub fn gated(received: usize, version: u64) -> Self {
        Self {
            received,
            gated: true,
            version,
            ..Default::default()
        }
    }

    /// Account for one merge into an existing track.
    pub fn record_merge(&mut self, effect: PathEffect) {
        self.updated += 1;
        match effect {
            PathEffect::Appended => self.appended_points += 1,
            PathEffect::Duplicate => self.duplicate_points += 1,
            PathEffect::NewSegment => self.new_segments += 1,
            PathEffect::NoCoordinates => {}
        }
    }

    /// Updates that reached a track.
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }
}

// =============================================================================
// INGEST STATS
// =============================================================================

/// Running totals of the ingest loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Batches accepted from the feed
    pub batches_received: u64,
    /// Envelopes that failed to decode
    pub envelopes_rejected: u64,
    /// Merge passes executed
    pub flushes: u64,
    /// Flushes skipped by the ingest gate
    pub gated_flushes: u64,
    /// Updates merged or used to create tracks
    pub updates_applied: u64,
    /// Updates without a derivable identity
    pub updates_dropped: u64,
    /// Buffered updates discarded at shutdown
    pub discarded_on_shutdown: u64,
}

impl IngestStats {
    /// Fold a batch report into the totals.
    pub fn record(&mut self, report: &BatchReport) {
        self.flushes += 1;
        if report.gated {
            self.gated_flushes += 1;
            return;
        }
        self.updates_applied += report.applied() as u64;
        self.updates_dropped += report.dropped as u64;
    }
}
