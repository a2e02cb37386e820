//! dronewatch Deterministic Simulation Harness
//!
//! A controlled environment where the ingestion pipeline runs against a
//! synthetic feed with known ground truth.
//!
//! # Core Principle: Everything From One Seed
//!
//! - **Time**: a virtual clock that only moves when the harness moves it
//! - **Feed**: oracle emissions with handoffs, duplicates and anonymous fixes
//! - **Delivery**: arrival jitter, sub-batching and stalls from a seeded stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────┐   ┌────────────┐   ┌──────────────────┐   │
//! │  │ FleetOracle  │──►│  Timeline  │──►│ Coalescer (80ms) │   │
//! │  │ (truth+feed) │   │ (arrivals) │   └────────┬─────────┘   │
//! │  └──────┬───────┘   └────────────┘            │             │
//! │         │                            ┌────────▼─────────┐   │
//! │         │          invariants        │    TrackStore    │   │
//! │         └───────────────────────────►│    snapshots     │   │
//! │                                      └──────────────────┘   │
//! │                 SimContext (virtual clock)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dronewatch_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let runner = ScenarioRunner::new(42, 20).with_duration(10.0);
//! let result = runner.run(ScenarioId::HandoffStorm)?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
mod replay;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{SimExport, SimFrame};
pub use oracle::{FleetOracle, GroundTruthDrone};
pub use replay::{replay_file, ReplayFeed, ReplaySummary};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
