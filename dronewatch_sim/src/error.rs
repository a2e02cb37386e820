//! Error types for the simulation harness.

use dronewatch_core::TrackingError;
use dronewatch_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed error: {0}")]
    Env(#[from] EnvError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Invalid simulation setup: {0}")]
    Setup(String),
}
