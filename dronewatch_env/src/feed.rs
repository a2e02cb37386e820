//! Feed transport abstraction: the boundary with the network collaborator.

use async_trait::async_trait;
use crate::types::FeedEnvelope;

/// Source of raw update batches.
///
/// # Implementations
///
/// - **Production**: a socket client owned by the host application
///   (connection fail-over and retry live there, not in the engine)
/// - **Simulation**: `ReplayFeed`, which reads recorded batches from disk
///
/// # Packet Flow
///
/// ```text
/// Transport                 Engine
///   |                          |
///   |-- recv() -> envelope --->|-- decode -> coalesce -> apply_batch
///   |                          |
/// ```
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Receives the next envelope from the feed.
    ///
    /// # Returns
    /// * `Some(envelope)` - A batch payload was received
    /// * `None` - The feed was closed (shutdown or end of recording)
    async fn recv(&self) -> Option<FeedEnvelope>;
    
    /// Human-readable name of the feed source (for logging).
    fn source_name(&self) -> String;
}
