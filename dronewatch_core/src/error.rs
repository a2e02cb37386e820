//! Errors raised by the ambient layers around the merge engine.
//!
//! The merge itself never fails: unusable updates are dropped and counted.

use thiserror::Error;

/// Errors that can occur while decoding, configuring or driving the engine.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    
    #[error("Feed payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    
    #[error("Invalid configuration: {0}")]
    Config(String),
    
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    #[error("Telemetry engine is shut down")]
    EngineClosed,
}

impl TrackingError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
