//! Feed wire format: GeoJSON-style feature collections of drone updates.
//!
//! The transport hands over opaque envelopes; this module turns them into
//! `UpdateBatch`es. Decoding is lenient at the record level: a record with a
//! missing or odd geometry simply has no coordinates, and unknown properties
//! are kept for identity resolution.

use crate::error::TrackingError;
use crate::geodesy::{lng_lat, Coordinate};
use dronewatch_env::FeedEnvelope;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Property carrying the source-side transport identifier.
pub const TRANSPORT_ID_FIELD: &str = "serial";

/// Where an update says the drone is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    /// Exactly `[lng, lat]`
    Pair(Coordinate),
    /// `[lng, lat, alt, ...]`: a position fix with extra components
    Fix(Coordinate),
    /// No usable coordinates
    Missing,
}

impl Location {
    /// The horizontal coordinate, if any.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Location::Pair(c) | Location::Fix(c) => Some(*c),
            Location::Missing => None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn feature_tag() -> &'static str {
    "Feature"
}

fn collection_tag() -> &'static str {
    "FeatureCollection"
}

/// A single drone update (one GeoJSON feature).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneUpdate {
    #[serde(rename = "type", default = "feature_tag", skip_deserializing)]
    kind: &'static str,

    /// Raw geometry object, decoded on demand
    #[serde(default)]
    pub geometry: Option<Value>,

    /// Side-channel fields: identity candidates, descriptors, altitude, yaw
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
}

impl Default for DroneUpdate {
    fn default() -> Self {
        Self::without_position()
    }
}

impl DroneUpdate {
    /// An update with no geometry.
    pub fn without_position() -> Self {
        Self {
            kind: feature_tag(),
            geometry: None,
            properties: Map::new(),
        }
    }

    /// An update at `[lng, lat]`.
    pub fn at(lng: f64, lat: f64) -> Self {
        Self::with_coordinates(vec![lng, lat])
    }

    /// A position fix at `[lng, lat, alt]`.
    pub fn fix(lng: f64, lat: f64, alt: f64) -> Self {
        Self::with_coordinates(vec![lng, lat, alt])
    }

    fn with_coordinates(coords: Vec<f64>) -> Self {
        let mut update = Self::without_position();
        update.geometry = Some(serde_json::json!({
            "type": "Point",
            "coordinates": coords,
        }));
        update
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Decode the geometry's coordinate array.
    pub fn location(&self) -> Location {
        let coords = match self
            .geometry
            .as_ref()
            .and_then(|g| g.get("coordinates"))
            .and_then(Value::as_array)
        {
            Some(c) => c,
            None => return Location::Missing,
        };

        if coords.len() < 2 {
            return Location::Missing;
        }
        let (lng, lat) = match (coords[0].as_f64(), coords[1].as_f64()) {
            (Some(lng), Some(lat)) => (lng, lat),
            _ => return Location::Missing,
        };

        if coords.len() == 2 {
            Location::Pair(lng_lat(lng, lat))
        } else {
            Location::Fix(lng_lat(lng, lat))
        }
    }

    /// The horizontal coordinate, if the geometry carries one.
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location().coordinate()
    }

    /// A non-empty string property.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.properties.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// A property usable as an identity: non-empty string, non-zero number
    /// or `true`. Whole floats render without a fraction (`42.0` -> `"42"`).
    pub fn identity_value(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => {
                (n.as_f64() != Some(0.0)).then(|| n.to_string())
            }
            Value::Number(n) => {
                let v = n.as_f64().filter(|v| *v != 0.0 && v.is_finite())?;
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    Some(format!("{}", v as i64))
                } else {
                    Some(v.to_string())
                }
            }
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    pub fn registration(&self) -> Option<&str> {
        self.text("registration")
    }

    /// Source-side transport identifier.
    pub fn transport_id(&self) -> Option<&str> {
        self.text(TRANSPORT_ID_FIELD)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.text("Name").or_else(|| self.text("name"))
    }

    pub fn pilot(&self) -> Option<&str> {
        self.text("pilot")
    }

    pub fn organization(&self) -> Option<&str> {
        self.text("organization")
    }

    pub fn altitude(&self) -> Option<f64> {
        self.number("altitude")
    }

    /// Heading in degrees.
    pub fn yaw(&self) -> Option<f64> {
        self.number("yaw")
    }
}

/// One batch of updates as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    #[serde(rename = "type", default = "collection_tag", skip_deserializing)]
    kind: &'static str,

    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<DroneUpdate>,
}

impl Default for UpdateBatch {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl UpdateBatch {
    pub fn new(features: Vec<DroneUpdate>) -> Self {
        Self {
            kind: collection_tag(),
            features,
        }
    }

    /// Parse a feature collection from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, TrackingError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode a transport envelope.
    pub fn decode(envelope: &FeedEnvelope) -> Result<Self, TrackingError> {
        Ok(serde_json::from_slice(&envelope.payload)?)
    }

    /// Encode as a transport envelope.
    pub fn to_envelope(&self, received_at_ms: u64) -> Result<FeedEnvelope, TrackingError> {
        Ok(FeedEnvelope::new(serde_json::to_vec(self)?, received_at_ms))
    }

    /// Concatenate batches, preserving arrival order.
    pub fn concat<I>(batches: I) -> Vec<DroneUpdate>
    where
        I: IntoIterator<Item = UpdateBatch>,
    {
        batches.into_iter().flat_map(|b| b.features).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<DroneUpdate>> for UpdateBatch {
    fn from(features: Vec<DroneUpdate>) -> Self {
        Self::new(features)
    }
}
