//! Error types for the dronewatch environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The feed was closed by the transport
    #[error("Feed closed")]
    FeedClosed,
    
    /// Transport-level failure (socket error, unreadable source, etc.)
    #[error("Transport error: {0}")]
    Transport(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
