//! Common types for the dronewatch environment abstraction.

use serde::{Deserialize, Serialize};

/// Envelope for one update batch as delivered by the transport.
///
/// The payload is opaque bytes; the core decodes it into an update batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEnvelope {
    /// The raw batch bytes (JSON feature collection)
    pub payload: Vec<u8>,
    
    /// Wall-clock arrival time (unix milliseconds)
    pub received_at_ms: u64,
}

impl FeedEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(payload: Vec<u8>, received_at_ms: u64) -> Self {
        Self {
            payload,
            received_at_ms,
        }
    }
    
    /// Creates an envelope from a text payload.
    pub fn from_text(text: impl Into<String>, received_at_ms: u64) -> Self {
        Self::new(text.into().into_bytes(), received_at_ms)
    }
    
    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
    
    /// Returns true if the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
