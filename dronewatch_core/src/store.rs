//! The track store: sole owner of drone tracks.
//!
//! Every `apply_batch` works on a private copy of the current snapshot and
//! publishes the result as one new immutable `FleetSnapshot`. Readers hold
//! `Arc`s to whole snapshots and never see a half-applied batch. Track records
//! are `Arc`-shared between versions; only the ones touched by a batch are
//! cloned.

use crate::compliance;
use crate::config::TrackerConfig;
use crate::error::TrackingError;
use crate::geodesy::Coordinate;
use crate::identity::{nearest_within, FleetMap, IdentityResolver};
use crate::metrics::{BatchReport, FleetCounters};
use crate::selection::ViewFilter;
use crate::spatial::ProximityIndex;
use crate::telemetry::DroneUpdate;
use crate::track::DroneTrack;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One immutable version of the fleet.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    version: u64,
    published_at_ms: u64,
    drones: FleetMap,
    index: ProximityIndex,
}

impl FleetSnapshot {
    fn empty(index: ProximityIndex) -> Self {
        Self {
            version: 0,
            published_at_ms: 0,
            drones: FleetMap::new(),
            index,
        }
    }

    /// Monotonic version; 0 is the empty initial snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Merge time of the batch that produced this version.
    pub fn published_at_ms(&self) -> u64 {
        self.published_at_ms
    }

    pub fn get(&self, key: &str) -> Option<&Arc<DroneTrack>> {
        self.drones.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.drones.contains_key(key)
    }

    /// All tracks in key order.
    pub fn iter(&self) -> impl Iterator<Item = &DroneTrack> {
        self.drones.values().map(Arc::as_ref)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.drones.keys().map(String::as_str)
    }

    /// Tracks passing `filter`, in key order.
    pub fn visible(&self, filter: ViewFilter) -> impl Iterator<Item = &DroneTrack> {
        self.iter().filter(move |t| filter.matches(t))
    }

    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    /// Compliance counts recomputed from this snapshot.
    pub fn counters(&self) -> FleetCounters {
        FleetCounters::from_tracks(self.iter())
    }

    /// Nearest track within `radius_m` of `point` (hover/picking helper).
    pub fn nearest(&self, point: &Coordinate, radius_m: f64) -> Option<(String, f64)> {
        nearest_within(point, radius_m, &self.drones, &self.index)
    }
}

// ============================================================================
// INGEST GATE
// ============================================================================

/// Shared enable/disable switch for ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestGate(Arc<AtomicBool>);

impl IngestGate {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// TRACK STORE
// ============================================================================

/// Owner of the fleet. Single writer: `apply_batch` takes `&mut self`.
pub struct TrackStore {
    config: TrackerConfig,
    current: Arc<FleetSnapshot>,
    publisher: watch::Sender<Arc<FleetSnapshot>>,
    gate: IngestGate,
}

impl TrackStore {
    /// Create an empty store.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackingError> {
        config.validate()?;
        let index = ProximityIndex::with_resolution(config.index_resolution)?;
        let current = Arc::new(FleetSnapshot::empty(index));
        let (publisher, _) = watch::channel(Arc::clone(&current));
        let gate = IngestGate::new(config.ingest_enabled_at_start);

        Ok(Self {
            config,
            current,
            publisher,
            gate,
        })
    }

    /// Create a store with default configuration and ingestion enabled.
    pub fn with_defaults() -> Result<Self, TrackingError> {
        let store = Self::new(TrackerConfig::default())?;
        store.gate.enable();
        Ok(store)
    }

    /// Merge one coalesced batch and publish the result.
    ///
    /// While the gate is closed the batch is dropped and nothing is published.
    pub fn apply_batch(&mut self, updates: &[DroneUpdate], now_ms: u64) -> BatchReport {
        if !self.gate.is_enabled() {
            debug!(updates = updates.len(), "ingestion disabled, batch dropped");
            return BatchReport::gated(updates.len(), self.current.version);
        }

        let mut drones = self.current.drones.clone();
        let mut index = self.current.index.clone();
        let resolver = IdentityResolver::new(&self.config);
        let mut report = BatchReport {
            received: updates.len(),
            ..Default::default()
        };

        for update in updates {
            let resolved = match resolver.resolve(update, &drones, &index) {
                Some(r) => r,
                None => {
                    trace!("update without derivable identity dropped");
                    report.dropped += 1;
                    continue;
                }
            };

            match drones.get_mut(&resolved.key) {
                Some(existing) => {
                    let before = existing.last_point().copied();
                    let track = Arc::make_mut(existing);
                    let effect = track.merge(update, now_ms);
                    if let (Some(old), Some(new)) = (before, track.last_point()) {
                        index.relocate(&resolved.key, &old, new);
                    }
                    report.record_merge(effect);
                }
                None => {
                    let track = DroneTrack::new(resolved.key.clone(), update, now_ms);
                    if let Some(point) = track.last_point() {
                        index.insert(&resolved.key, point);
                    }
                    trace!(key = %resolved.key, source = ?resolved.source, "track created");
                    drones.insert(resolved.key, Arc::new(track));
                    report.created += 1;
                }
            }
        }

        let snapshot = Arc::new(FleetSnapshot {
            version: self.current.version + 1,
            published_at_ms: now_ms,
            drones,
            index,
        });
        report.version = snapshot.version;
        self.current = Arc::clone(&snapshot);
        self.publisher.send_replace(snapshot);

        debug!(
            version = report.version,
            received = report.received,
            created = report.created,
            updated = report.updated,
            dropped = report.dropped,
            new_segments = report.new_segments,
            "batch applied"
        );

        report
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.current)
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.publisher.subscribe()
    }

    /// Handle to the ingest gate.
    pub fn gate(&self) -> IngestGate {
        self.gate.clone()
    }

    pub fn enable_ingest(&self) {
        self.gate.enable();
    }

    pub fn disable_ingest(&self) {
        self.gate.disable();
    }

    /// Counters over the live snapshot.
    pub fn counters(&self) -> FleetCounters {
        self.current.counters()
    }

    /// The compliance rule, exposed for consumers.
    pub fn is_allowed_registration(&self, registration: &str) -> bool {
        compliance::is_allowed(registration)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
