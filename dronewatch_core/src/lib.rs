//! dronewatch Core - Drone Telemetry Ingestion and Track Reconstruction
//!
//! Turns a stream of loosely-identified position updates into a stable set of
//! drone tracks:
//! 1. **Identity**: configured fields, then quantized coordinates, then the
//!    nearest known track within 800 m (H3-pruned)
//! 2. **Reconstruction**: paths split into segments at every transport handoff,
//!    descriptors merged by an explicit per-field rule table
//! 3. **Publication**: coalesced 80 ms merges, each published as one immutable
//!    snapshot with compliance counters

pub mod geodesy;
pub mod compliance;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod spatial;
pub mod track;
pub mod identity;
pub mod store;
pub mod batcher;
pub mod selection;
pub mod metrics;
pub mod render;
pub mod engine;

// Re-export key types for convenience
pub use batcher::Coalescer;
pub use compliance::{is_allowed, Compliance};
pub use config::TrackerConfig;
pub use engine::{pump_feed, EngineHandle, TelemetryEngine};
pub use error::TrackingError;
pub use identity::{IdentityResolver, IdentitySource, ResolvedIdentity};
pub use metrics::{BatchReport, FleetCounters, IngestStats};
pub use render::{feature_layers, FeatureLayers};
pub use selection::{SelectionState, ViewFilter};
pub use spatial::ProximityIndex;
pub use store::{FleetSnapshot, IngestGate, TrackStore};
pub use telemetry::{DroneUpdate, Location, UpdateBatch};
pub use track::{DroneTrack, PathEffect, Position};
