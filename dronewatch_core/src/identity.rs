//! Identity resolution: maps an incoming update to a stable track key.
//!
//! Resolution order, first match wins:
//! 1. The configured identity fields, in order (first non-empty value)
//! 2. A coordinate pair, quantized to a synthetic `"lng,lat"` key
//! 3. The nearest known track within the match radius
//!
//! Position fixes (`[lng, lat, alt, ...]`) skip step 2 and go straight to the
//! nearest-neighbour match; when nothing is close enough they fall back to
//! the quantized key of their horizontal pair, starting a new track.

use crate::config::TrackerConfig;
use crate::geodesy::{distance_meters, Coordinate};
use crate::spatial::{Candidates, ProximityIndex};
use crate::telemetry::{DroneUpdate, Location};
use crate::track::DroneTrack;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Track map keyed by stable identity, iterated in key order.
pub type FleetMap = BTreeMap<String, Arc<DroneTrack>>;

/// How a key was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentitySource {
    /// Read from the named update property
    Field(String),
    /// Derived from quantized coordinates
    Quantized,
    /// Reused from the nearest existing track
    NearestNeighbour { distance_m: f64 },
}

/// A resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub key: String,
    pub source: IdentitySource,
}

/// Derives stable keys from updates. Reads the fleet, never mutates it.
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver<'a> {
    config: &'a TrackerConfig,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(config: &'a TrackerConfig) -> Self {
        Self { config }
    }

    /// Resolve the key for `update`, or `None` if it must be dropped.
    pub fn resolve(
        &self,
        update: &DroneUpdate,
        fleet: &FleetMap,
        index: &ProximityIndex,
    ) -> Option<ResolvedIdentity> {
        if let Some(found) = self.from_fields(update) {
            return Some(found);
        }

        match update.location() {
            Location::Pair(coord) => Some(ResolvedIdentity {
                key: self.quantized_key(&coord),
                source: IdentitySource::Quantized,
            }),
            Location::Fix(coord) => {
                let nearest = nearest_within(&coord, self.config.match_radius_m, fleet, index);
                Some(match nearest {
                    Some((key, distance_m)) => ResolvedIdentity {
                        key,
                        source: IdentitySource::NearestNeighbour { distance_m },
                    },
                    None => ResolvedIdentity {
                        key: self.quantized_key(&coord),
                        source: IdentitySource::Quantized,
                    },
                })
            }
            Location::Missing => None,
        }
    }

    fn from_fields(&self, update: &DroneUpdate) -> Option<ResolvedIdentity> {
        self.config.identity_fields.iter().find_map(|field| {
            update.identity_value(field).map(|key| ResolvedIdentity {
                key,
                source: IdentitySource::Field(field.clone()),
            })
        })
    }

    /// Synthetic key: longitude and latitude at the configured precision.
    pub fn quantized_key(&self, coord: &Coordinate) -> String {
        let d = self.config.quantize_decimals;
        format!("{},{}", fixed(coord.x, d), fixed(coord.y, d))
    }
}

/// Fixed-point text with ties rounded away from zero.
///
/// `{:.N}` rounds exact ties to even (`34.0625` -> `34.062`) and keeps the
/// sign of negative zero; keys round ties up in magnitude (`34.063`) and
/// print `-0.0` as `0.000`. Values that round to zero from below keep
/// their sign (`-0.0001` -> `-0.000`).
fn fixed(value: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    let magnitude = (value.abs() * scale).round() / scale;
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{:.*}", sign, decimals, magnitude)
}

/// Nearest track whose last point lies within `radius_m` of `point`.
///
/// Equidistant tracks resolve to the lowest key.
pub fn nearest_within(
    point: &Coordinate,
    radius_m: f64,
    fleet: &FleetMap,
    index: &ProximityIndex,
) -> Option<(String, f64)> {
    // Both sources iterate in key order, so strict `<` keeps the lowest key on ties
    let scan: Vec<&DroneTrack> = match index.candidates(point, radius_m) {
        Candidates::Keys(keys) => keys
            .iter()
            .filter_map(|key| fleet.get(key))
            .map(Arc::as_ref)
            .collect(),
        Candidates::Everything => fleet.values().map(Arc::as_ref).collect(),
    };

    let mut best: Option<(&str, f64)> = None;
    for track in scan {
        let dist = distance_meters(Some(point), track.last_point());
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((track.id(), dist));
        }
    }

    best.filter(|(_, d)| *d <= radius_m)
        .map(|(key, d)| (key.to_string(), d))
}
