//! Recorded feed playback.
//!
//! A recording is NDJSON: one feature collection per line, in delivery order.
//! `ReplayFeed` serves the lines as `FeedEnvelope`s so a recording can be
//! pushed through the real telemetry engine with `pump_feed`.

use crate::error::SimError;
use async_trait::async_trait;
use dronewatch_core::{pump_feed, FleetSnapshot, IngestStats, TelemetryEngine, TrackerConfig, UpdateBatch};
use dronewatch_env::{EnvError, FeedEnvelope, FeedTransport, TokioContext, TrackerContext};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// `FeedTransport` over a recorded NDJSON file.
pub struct ReplayFeed {
    source: PathBuf,
    lines: Mutex<VecDeque<String>>,

    /// Pause between envelopes; `None` replays as fast as possible
    interval: Option<Duration>,

    /// Stamps arrival times
    clock: TokioContext,
}

impl ReplayFeed {
    /// Load a recording. Blank lines are skipped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let source = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&source)
            .await
            .map_err(|e| EnvError::transport(format!("{}: {}", source.display(), e)))?;

        Ok(Self::from_lines(source, text.lines()))
    }

    fn from_lines<'a>(source: PathBuf, lines: impl Iterator<Item = &'a str>) -> Self {
        let lines = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            source,
            lines: Mutex::new(lines),
            interval: None,
            clock: TokioContext::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Envelopes not yet delivered.
    pub async fn remaining(&self) -> usize {
        self.lines.lock().await.len()
    }

    /// Write batches as an NDJSON recording.
    pub fn write_recording(path: impl AsRef<Path>, batches: &[UpdateBatch]) -> Result<(), SimError> {
        let mut out = String::new();
        for batch in batches {
            out.push_str(&serde_json::to_string(batch)?);
            out.push('\n');
        }
        std::fs::write(path, out)?;
        Ok(())
    }
}

#[async_trait]
impl FeedTransport for ReplayFeed {
    async fn recv(&self) -> Option<FeedEnvelope> {
        let line = self.lines.lock().await.pop_front()?;
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }
        Some(FeedEnvelope::from_text(line, self.clock.unix_millis()))
    }

    fn source_name(&self) -> String {
        format!("replay:{}", self.source.display())
    }
}

/// Outcome of pushing a recording through the engine.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub envelopes: u64,
    pub snapshot: Arc<FleetSnapshot>,
    pub stats: IngestStats,
}

/// Replay a recording through a real engine and return the final state.
pub async fn replay_file(path: impl AsRef<Path>, config: TrackerConfig) -> Result<ReplaySummary, SimError> {
    let feed = ReplayFeed::open(path).await?;

    let engine = TelemetryEngine::spawn(TokioContext::shared(), config)?;
    engine.enable_ingest();

    let envelopes = pump_feed(&engine, &feed).await?;
    engine.drain().await?;

    let summary = ReplaySummary {
        envelopes,
        snapshot: engine.snapshot(),
        stats: engine.stats(),
    };
    info!(
        envelopes,
        tracks = summary.snapshot.len(),
        merges = summary.stats.flushes,
        rejected = summary.stats.envelopes_rejected,
        "replay finished"
    );
    Ok(summary)
}
