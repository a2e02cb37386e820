//! Per-drone track record and its merge rules.
//!
//! A `DroneTrack` is created from the first update that resolves to a new
//! identity and then merged in place. Descriptive fields follow the rule
//! table in `MERGE_RULES`; the path is kept as segments split on transport
//! handoffs, plus a flattened copy for path rendering.

use crate::compliance::Compliance;
use crate::geodesy::{lng_lat, path_length_meters, Coordinate};
use crate::telemetry::DroneUpdate;
use geo::LineString;
use serde::{Deserialize, Serialize};

// ============================================================================
// MERGE RULES
// ============================================================================

/// How an incoming value combines with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// First non-empty value wins; never cleared or replaced
    Sticky,
    /// Replaced whenever the update carries a value, else kept
    LatestPresent,
}

impl MergeRule {
    /// Apply the rule to one field.
    pub fn apply<T>(self, current: &mut Option<T>, incoming: Option<T>) {
        match self {
            MergeRule::Sticky => {
                if current.is_none() {
                    *current = incoming;
                }
            }
            MergeRule::LatestPresent => {
                if incoming.is_some() {
                    *current = incoming;
                }
            }
        }
    }
}

/// Fields of a track record that are merged from update properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackField {
    Registration,
    DisplayName,
    Pilot,
    Organization,
    Altitude,
    Yaw,
    TransportId,
}

/// The merge rule of every merged field.
pub const MERGE_RULES: &[(TrackField, MergeRule)] = &[
    (TrackField::Registration, MergeRule::Sticky),
    (TrackField::DisplayName, MergeRule::Sticky),
    (TrackField::Pilot, MergeRule::Sticky),
    (TrackField::Organization, MergeRule::Sticky),
    (TrackField::Altitude, MergeRule::LatestPresent),
    (TrackField::Yaw, MergeRule::LatestPresent),
    (TrackField::TransportId, MergeRule::LatestPresent),
];

// ============================================================================
// TRACK RECORD
// ============================================================================

/// Latest known position of a drone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Longitude/latitude in degrees
    pub coord: Coordinate,

    /// Altitude as reported by the feed
    pub altitude: Option<f64>,

    /// Heading in degrees
    pub yaw: Option<f64>,
}

/// What a merge did to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEffect {
    /// Point appended to the current segment
    Appended,
    /// Point equal to the segment's last point; nothing appended
    Duplicate,
    /// Transport handoff; a new segment was started
    NewSegment,
    /// Update carried no coordinates; path untouched
    NoCoordinates,
}

/// One tracked drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneTrack {
    // === Identity ===

    /// Stable key, immutable after creation
    id: String,

    /// Most recent source-side transport identifier
    pub current_transport_id: Option<String>,

    // === Descriptors (sticky) ===

    pub registration: Option<String>,
    pub display_name: Option<String>,
    pub pilot: Option<String>,
    pub organization: Option<String>,

    // === Kinematics ===

    pub position: Position,

    /// Path split into segments at every transport handoff
    segments: Vec<LineString<f64>>,

    /// All segments concatenated in order
    flattened: LineString<f64>,

    // === Bookkeeping ===

    /// Creation time (unix ms)
    pub started_at_ms: u64,

    /// Time of the most recent merge (unix ms)
    pub last_updated_at_ms: u64,

    /// Number of updates merged, including the creating one
    pub update_count: u64,
}

impl DroneTrack {
    /// Create a track from its first update.
    ///
    /// Updates without coordinates start the path at `[0, 0]`.
    pub fn new(id: impl Into<String>, update: &DroneUpdate, now_ms: u64) -> Self {
        let coord = update.coordinate().unwrap_or_else(|| lng_lat(0.0, 0.0));
        let first_segment = LineString::new(vec![coord]);

        let mut track = Self {
            id: id.into(),
            current_transport_id: None,
            registration: None,
            display_name: None,
            pilot: None,
            organization: None,
            position: Position {
                coord,
                altitude: None,
                yaw: None,
            },
            flattened: first_segment.clone(),
            segments: vec![first_segment],
            started_at_ms: now_ms,
            last_updated_at_ms: now_ms,
            update_count: 1,
        };
        track.merge_fields(update);
        track
    }

    /// Merge a subsequent update into this track.
    pub fn merge(&mut self, update: &DroneUpdate, now_ms: u64) -> PathEffect {
        let effect = match update.coordinate() {
            Some(coord) => {
                let effect = self.extend_path(coord, update.transport_id());
                self.position.coord = coord;
                effect
            }
            None => PathEffect::NoCoordinates,
        };

        self.flattened = flatten(&self.segments);
        self.merge_fields(update);
        self.last_updated_at_ms = now_ms;
        self.update_count += 1;

        effect
    }

    fn extend_path(&mut self, coord: Coordinate, transport_id: Option<&str>) -> PathEffect {
        let handoff = match transport_id {
            Some(incoming) => self.current_transport_id.as_deref() != Some(incoming),
            None => false,
        };

        match self.segments.last_mut() {
            Some(segment) if !handoff => {
                if segment.0.last() == Some(&coord) {
                    PathEffect::Duplicate
                } else {
                    segment.0.push(coord);
                    PathEffect::Appended
                }
            }
            _ => {
                self.segments.push(LineString::new(vec![coord]));
                PathEffect::NewSegment
            }
        }
    }

    /// Apply `MERGE_RULES` to every descriptor and kinematic field.
    fn merge_fields(&mut self, update: &DroneUpdate) {
        let owned = |v: Option<&str>| v.map(str::to_string);

        for (field, rule) in MERGE_RULES {
            match field {
                TrackField::Registration => {
                    rule.apply(&mut self.registration, owned(update.registration()))
                }
                TrackField::DisplayName => {
                    rule.apply(&mut self.display_name, owned(update.display_name()))
                }
                TrackField::Pilot => rule.apply(&mut self.pilot, owned(update.pilot())),
                TrackField::Organization => {
                    rule.apply(&mut self.organization, owned(update.organization()))
                }
                TrackField::Altitude => rule.apply(&mut self.position.altitude, update.altitude()),
                TrackField::Yaw => rule.apply(&mut self.position.yaw, update.yaw()),
                TrackField::TransportId => {
                    rule.apply(&mut self.current_transport_id, owned(update.transport_id()))
                }
            }
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn segments(&self) -> &[LineString<f64>] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The whole path, all segments in order.
    pub fn flattened_path(&self) -> &LineString<f64> {
        &self.flattened
    }

    /// Last point of the current segment.
    pub fn last_point(&self) -> Option<&Coordinate> {
        self.segments.last().and_then(|s| s.0.last())
    }

    /// Registration as seen by the compliance rule (empty when unknown).
    pub fn registration_code(&self) -> &str {
        self.registration.as_deref().unwrap_or("")
    }

    pub fn compliance(&self) -> Compliance {
        Compliance::classify(self.registration_code())
    }

    pub fn is_allowed(&self) -> bool {
        self.compliance().is_allowed()
    }

    /// Display name, or "Drone" when none was ever reported.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Drone")
    }

    /// Length of the flattened path in meters.
    ///
    /// Handoff jumps between segments are not counted.
    pub fn path_length_m(&self) -> f64 {
        self.segments.iter().map(|s| path_length_meters(&s.0)).sum()
    }

    /// Time between the first and the most recent update.
    pub fn tracked_for_ms(&self) -> u64 {
        self.last_updated_at_ms.saturating_sub(self.started_at_ms)
    }
}

fn flatten(segments: &[LineString<f64>]) -> LineString<f64> {
    LineString::new(segments.iter().flat_map(|s| s.0.iter().copied()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(lng: f64, lat: f64) -> DroneUpdate {
        DroneUpdate::at(lng, lat)
    }

    #[test]
    fn test_new_track() {
        let update = at(34.0, 32.0)
            .with_property("registration", "SG-BA")
            .with_property("serial", "S1")
            .with_property("Name", "Falcon")
            .with_property("altitude", 50.0);
        let track = DroneTrack::new("SG-BA", &update, 1000);

        assert_eq!(track.id(), "SG-BA");
        assert_eq!(track.segment_count(), 1);
        assert_eq!(track.flattened_path().0, vec![lng_lat(34.0, 32.0)]);
        assert_eq!(track.current_transport_id.as_deref(), Some("S1"));
        assert_eq!(track.label(), "Falcon");
        assert_eq!(track.position.altitude, Some(50.0));
        assert_eq!(track.started_at_ms, 1000);
        assert!(track.is_allowed());
    }

    #[test]
    fn test_new_track_without_coordinates_starts_at_origin() {
        let update = DroneUpdate::without_position().with_property("registration", "X");
        let track = DroneTrack::new("X", &update, 0);
        assert_eq!(track.last_point(), Some(&lng_lat(0.0, 0.0)));
        assert_eq!(track.label(), "Drone");
    }

    #[test]
    fn test_duplicate_point_suppressed() {
        let mut track = DroneTrack::new("A", &at(1.0, 1.0), 0);
        assert_eq!(track.merge(&at(1.0, 1.0), 1), PathEffect::Duplicate);
        assert_eq!(track.merge(&at(1.0, 2.0), 2), PathEffect::Appended);
        assert_eq!(track.merge(&at(1.0, 2.0), 3), PathEffect::Duplicate);
        assert_eq!(track.flattened_path().0.len(), 2);
        assert_eq!(track.update_count, 4);
        assert_eq!(track.last_updated_at_ms, 3);
    }

    #[test]
    fn test_handoff_starts_segment() {
        let mut track = DroneTrack::new("A", &at(1.0, 1.0).with_property("serial", "X"), 0);
        track.merge(&at(1.0, 1.1).with_property("serial", "X"), 1);

        let effect = track.merge(&at(1.0, 1.2).with_property("serial", "Y"), 2);
        assert_eq!(effect, PathEffect::NewSegment);
        assert_eq!(track.segment_count(), 2);
        assert_eq!(track.segments()[1].0, vec![lng_lat(1.0, 1.2)]);
        assert_eq!(track.current_transport_id.as_deref(), Some("Y"));
        assert_eq!(track.id(), "A");

        // Absent transport id continues the current segment
        assert_eq!(track.merge(&at(1.0, 1.3), 3), PathEffect::Appended);
        assert_eq!(track.segment_count(), 2);
        assert_eq!(track.current_transport_id.as_deref(), Some("Y"));
    }

    #[test]
    fn test_handoff_from_unknown_transport() {
        // First sighting had no serial; the first serial seen splits the path
        let mut track = DroneTrack::new("A", &at(1.0, 1.0), 0);
        assert_eq!(
            track.merge(&at(1.0, 1.0).with_property("serial", "S"), 1),
            PathEffect::NewSegment
        );
        assert_eq!(track.flattened_path().0.len(), 2);
    }

    #[test]
    fn test_update_without_coordinates_keeps_path() {
        let mut track = DroneTrack::new("A", &at(1.0, 1.0), 0);
        let effect = track.merge(
            &DroneUpdate::without_position()
                .with_property("serial", "Z")
                .with_property("yaw", 45.0),
            1,
        );
        assert_eq!(effect, PathEffect::NoCoordinates);
        assert_eq!(track.segment_count(), 1);
        assert_eq!(track.position.coord, lng_lat(1.0, 1.0));
        assert_eq!(track.position.yaw, Some(45.0));
        // The transport id is still recorded
        assert_eq!(track.current_transport_id.as_deref(), Some("Z"));
    }

    #[test]
    fn test_sticky_fields_never_regress() {
        let mut track = DroneTrack::new(
            "A",
            &at(0.0, 0.0).with_property("pilot", "Dana"),
            0,
        );
        track.merge(
            &at(0.0, 0.1)
                .with_property("pilot", "")
                .with_property("organization", "Air Corp")
                .with_property("registration", "SD-CA"),
            1,
        );
        track.merge(
            &at(0.0, 0.2)
                .with_property("pilot", "Eli")
                .with_property("organization", "Other")
                .with_property("registration", "SG-BA"),
            2,
        );

        assert_eq!(track.pilot.as_deref(), Some("Dana"));
        assert_eq!(track.organization.as_deref(), Some("Air Corp"));
        assert_eq!(track.registration.as_deref(), Some("SD-CA"));
        assert!(!track.is_allowed());
    }

    #[test]
    fn test_altitude_and_yaw_latest_present() {
        let mut track = DroneTrack::new(
            "A",
            &at(0.0, 0.0).with_property("altitude", 10.0).with_property("yaw", 1.0),
            0,
        );
        track.merge(&at(0.0, 0.1).with_property("altitude", 20.0), 1);
        assert_eq!(track.position.altitude, Some(20.0));
        assert_eq!(track.position.yaw, Some(1.0));
    }

    #[test]
    fn test_path_length_ignores_handoff_jump() {
        let mut track = DroneTrack::new("A", &at(0.0, 0.0).with_property("serial", "X"), 0);
        track.merge(&at(0.0, 1.0).with_property("serial", "X"), 1);
        track.merge(&at(10.0, 10.0).with_property("serial", "Y"), 2);
        let one_degree = crate::geodesy::EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        approx::assert_relative_eq!(track.path_length_m(), one_degree, epsilon = 1e-6);
        assert_eq!(track.tracked_for_ms(), 2);
    }

    #[test]
    fn test_merge_rule_apply() {
        let mut v = None;
        MergeRule::Sticky.apply(&mut v, Some(1));
        MergeRule::Sticky.apply(&mut v, Some(2));
        MergeRule::Sticky.apply(&mut v, None);
        assert_eq!(v, Some(1));

        MergeRule::LatestPresent.apply(&mut v, Some(3));
        MergeRule::LatestPresent.apply(&mut v, None);
        assert_eq!(v, Some(3));
    }

    fn update_strategy() -> impl Strategy<Value = DroneUpdate> {
        (
            prop::option::of((0u8..4, 0u8..4)),
            prop::option::of(prop::sample::select(vec!["X", "Y", "Z"])),
        )
            .prop_map(|(point, serial)| {
                let mut u = match point {
                    Some((x, y)) => DroneUpdate::at(x as f64 * 0.01, y as f64 * 0.01),
                    None => DroneUpdate::without_position(),
                };
                if let Some(s) = serial {
                    u = u.with_property("serial", s);
                }
                u
            })
    }

    proptest! {
        #[test]
        fn prop_flattened_is_concatenation(updates in prop::collection::vec(update_strategy(), 1..40)) {
            let mut track = DroneTrack::new("P", &updates[0], 0);
            let mut splits = 0;
            for (i, u) in updates.iter().enumerate().skip(1) {
                if track.merge(u, i as u64) == PathEffect::NewSegment {
                    splits += 1;
                }
            }

            let concat: Vec<Coordinate> = track
                .segments()
                .iter()
                .flat_map(|s| s.0.iter().copied())
                .collect();
            prop_assert_eq!(&track.flattened_path().0, &concat);
            prop_assert_eq!(track.segment_count(), splits + 1);

            // No consecutive duplicates inside a segment
            for seg in track.segments() {
                prop_assert!(!seg.0.is_empty());
                for w in seg.0.windows(2) {
                    prop_assert_ne!(w[0], w[1]);
                }
            }

            // The last point tracks the most recent position
            prop_assert_eq!(track.last_point(), Some(&track.position.coord));
        }
    }
}
