//! Runtime configuration for the ingestion engine.

use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Identity fields tried in order before falling back to coordinates.
pub const DEFAULT_IDENTITY_FIELDS: &[&str] = &[
    "registration",
    "serial",
    "Registration",
    "Name",
    "name",
    "id",
    "droneId",
];

/// Configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Update properties tried, in order, as the stable identity
    pub identity_fields: Vec<String>,
    
    /// Decimal places used for coordinate-derived keys (default: 3, ~110 m)
    pub quantize_decimals: usize,
    
    /// Nearest-neighbour match radius in meters (default: 800)
    pub match_radius_m: f64,
    
    /// Coalescing window in milliseconds (default: 80)
    pub flush_window_ms: u64,
    
    /// H3 resolution of the proximity index (default: 6, ~3.7 km edges)
    pub index_resolution: u8,
    
    /// Whether ingestion starts enabled (default: false)
    pub ingest_enabled_at_start: bool,
    
    /// Capacity of the engine's submit queue, in batches
    pub submit_queue_depth: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            identity_fields: DEFAULT_IDENTITY_FIELDS.iter().map(|f| f.to_string()).collect(),
            quantize_decimals: 3,
            match_radius_m: 800.0,
            flush_window_ms: 80,
            index_resolution: 6,
            ingest_enabled_at_start: false,
            submit_queue_depth: 1024,
        }
    }
}

impl TrackerConfig {
    /// The coalescing window as a `Duration`.
    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_window_ms)
    }
    
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing keys take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, TrackingError> {
        let config: TrackerConfig = serde_json::from_str(json)
            .map_err(|e| TrackingError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
    
    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrackingError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
    
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.identity_fields.iter().all(|f| f.is_empty()) {
            return Err(TrackingError::config("identity_fields must name at least one field"));
        }
        if !(self.match_radius_m.is_finite() && self.match_radius_m > 0.0) {
            return Err(TrackingError::config(format!(
                "match_radius_m must be positive, got {}",
                self.match_radius_m
            )));
        }
        if self.flush_window_ms == 0 {
            return Err(TrackingError::config("flush_window_ms must be at least 1"));
        }
        if self.quantize_decimals > 9 {
            return Err(TrackingError::config(format!(
                "quantize_decimals must be <= 9, got {}",
                self.quantize_decimals
            )));
        }
        if self.index_resolution > 15 {
            return Err(TrackingError::config(format!(
                "index_resolution must be <= 15, got {}",
                self.index_resolution
            )));
        }
        if self.submit_queue_depth == 0 {
            return Err(TrackingError::config("submit_queue_depth must be at least 1"));
        }
        Ok(())
    }
}
