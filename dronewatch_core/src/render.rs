//! GeoJSON layers for map consumers.
//!
//! Two feature collections per snapshot: one point per visible drone and one
//! line per drone whose path has more than one point.

use crate::selection::ViewFilter;
use crate::store::FleetSnapshot;
use crate::track::DroneTrack;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Point and line layers, each a `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayers {
    pub points: Value,
    pub lines: Value,
}

impl FeatureLayers {
    pub fn point_count(&self) -> usize {
        feature_count(&self.points)
    }

    pub fn line_count(&self) -> usize {
        feature_count(&self.lines)
    }
}

fn feature_count(collection: &Value) -> usize {
    collection["features"].as_array().map_or(0, Vec::len)
}

fn collection(features: Vec<Value>) -> Value {
    json!({ "type": "FeatureCollection", "features": features })
}

fn allowed_flag(track: &DroneTrack) -> u8 {
    u8::from(track.is_allowed())
}

fn point_feature(track: &DroneTrack) -> Value {
    let coord = track.position.coord;
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [coord.x, coord.y] },
        "properties": {
            "serial": track.id(),
            "name": track.label(),
            "registration": track.registration,
            "altitude": track.position.altitude,
            "yaw": track.position.yaw,
            "allowed": allowed_flag(track),
            "colour": track.compliance().colour(),
            "path_length_m": track.path_length_m(),
            "tracked_for_ms": track.tracked_for_ms(),
        },
    })
}

fn line_feature(track: &DroneTrack) -> Option<Value> {
    let path = track.flattened_path();
    if path.0.len() < 2 {
        return None;
    }
    let coordinates: Vec<[f64; 2]> = path.0.iter().map(|c| [c.x, c.y]).collect();
    Some(json!({
        "type": "Feature",
        "geometry": { "type": "LineString", "coordinates": coordinates },
        "properties": {
            "serial": track.id(),
            "allowed": allowed_flag(track),
        },
    }))
}

/// Build the render layers for every track in `snapshot` passing `filter`.
pub fn feature_layers(snapshot: &FleetSnapshot, filter: ViewFilter) -> FeatureLayers {
    let mut points = Vec::new();
    let mut lines = Vec::new();

    for track in snapshot.visible(filter) {
        points.push(point_feature(track));
        lines.extend(line_feature(track));
    }

    FeatureLayers {
        points: collection(points),
        lines: collection(lines),
    }
}
