//! Core environment context trait for dronewatch engines.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the ingestion engine can run
/// both in production (tokio) and under a virtual clock in simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the system clock
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
#[async_trait]
pub trait TrackerContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for the batching window. In simulation, this is the virtual clock.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time used to stamp track records.
    fn system_time(&self) -> SystemTime;
    
    /// Wall-clock time as milliseconds since the Unix epoch.
    ///
    /// Clocks set before the epoch read as 0.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Spawns a background task.
    ///
    /// The name is attached to the task's tracing span.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
