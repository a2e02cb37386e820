//! H3 proximity index used to prune nearest-neighbour candidates.
//!
//! Keys are bucketed by the H3 cell of their last known point. A radius query
//! returns every key in a k-ring large enough to cover the radius, so the
//! exact haversine check downstream sees a superset of the true matches.

use crate::error::TrackingError;
use crate::geodesy::Coordinate;
use h3o::{CellIndex, LatLng, Resolution};
use std::collections::{BTreeSet, HashMap};

/// Largest k-ring walked per query; wider radii scan the whole fleet instead.
const MAX_DISK_CELLS: u64 = 4096;

/// Result of a candidate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// Only these keys can be within the radius
    Keys(BTreeSet<String>),
    /// The query point could not be indexed, or the k-ring would be larger
    /// than the fleet; scan every key
    Everything,
}

/// Cell-bucketed index from last known point to identity key.
#[derive(Debug, Clone)]
pub struct ProximityIndex {
    /// H3 resolution of the buckets
    resolution: Resolution,

    /// Maps H3 cells to the keys whose last point lies in that cell
    cells: HashMap<CellIndex, BTreeSet<String>>,

    /// Keys whose point could not be converted to a cell; always candidates
    overflow: BTreeSet<String>,
}

impl ProximityIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cells: HashMap::new(),
            overflow: BTreeSet::new(),
        }
    }

    /// Create an index from a raw resolution number (0-15).
    pub fn with_resolution(resolution: u8) -> Result<Self, TrackingError> {
        let resolution = Resolution::try_from(resolution)
            .map_err(|e| TrackingError::config(format!("index resolution: {}", e)))?;
        Ok(Self::new(resolution))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Convert a longitude/latitude pair to an H3 cell.
    pub fn cell_of(&self, point: &Coordinate) -> Result<CellIndex, TrackingError> {
        let latlng = LatLng::new(point.y, point.x)
            .map_err(|e| TrackingError::InvalidCoordinates(format!("{:?}", e)))?;
        Ok(latlng.to_cell(self.resolution))
    }

    /// Index `key` at `point`.
    pub fn insert(&mut self, key: &str, point: &Coordinate) {
        match self.cell_of(point) {
            Ok(cell) => {
                self.cells
                    .entry(cell)
                    .or_default()
                    .insert(key.to_string());
            }
            Err(_) => {
                self.overflow.insert(key.to_string());
            }
        }
    }

    /// Remove `key`, previously indexed at `point`.
    pub fn remove(&mut self, key: &str, point: &Coordinate) {
        match self.cell_of(point) {
            Ok(cell) => {
                if let Some(set) = self.cells.get_mut(&cell) {
                    set.remove(key);
                    // Clean up empty cells
                    if set.is_empty() {
                        self.cells.remove(&cell);
                    }
                }
            }
            Err(_) => {
                self.overflow.remove(key);
            }
        }
    }

    /// Move `key` from `old` to `new` if that changes its bucket.
    pub fn relocate(&mut self, key: &str, old: &Coordinate, new: &Coordinate) {
        if old == new {
            return;
        }
        let same_cell = match (self.cell_of(old), self.cell_of(new)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_cell {
            self.remove(key, old);
            self.insert(key, new);
        }
    }

    /// Number of k-rings needed to cover `radius_m` around any point.
    ///
    /// Half the average edge length is a lower bound on the distance from a
    /// point to the far side of its neighbouring ring, with margin for the
    /// size variation of cells across the globe.
    pub fn rings_for_radius(&self, radius_m: f64) -> u32 {
        let half_edge = self.resolution.edge_length_m() * 0.5;
        (radius_m / half_edge).ceil().max(1.0) as u32
    }

    /// Cells in a k-ring of `rings`.
    pub fn disk_cells(rings: u32) -> u64 {
        let k = u64::from(rings);
        3 * k * (k + 1) + 1
    }

    /// Keys that may lie within `radius_m` of `point`.
    pub fn candidates(&self, point: &Coordinate, radius_m: f64) -> Candidates {
        let center = match self.cell_of(point) {
            Ok(cell) => cell,
            Err(_) => return Candidates::Everything,
        };

        let rings = self.rings_for_radius(radius_m);
        if Self::disk_cells(rings) > MAX_DISK_CELLS.max(self.len() as u64) {
            return Candidates::Everything;
        }

        let mut result = self.overflow.clone();
        for cell in center.grid_disk_safe(rings) {
            if let Some(keys) = self.cells.get(&cell) {
                result.extend(keys.iter().cloned());
            }
        }

        Candidates::Keys(result)
    }

    /// Total number of indexed keys.
    pub fn len(&self) -> usize {
        self.cells.values().map(|s| s.len()).sum::<usize>() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::{distance_meters, lng_lat};

    fn index() -> ProximityIndex {
        ProximityIndex::with_resolution(6).unwrap()
    }

    #[test]
    fn test_insert_and_query() {
        let mut idx = index();
        let p = lng_lat(-122.4194, 37.7749); // San Francisco
        idx.insert("A", &p);

        assert_eq!(idx.len(), 1);
        assert_eq!(idx.cell_count(), 1);

        match idx.candidates(&p, 800.0) {
            Candidates::Keys(keys) => assert!(keys.contains("A")),
            Candidates::Everything => panic!("valid point should be indexed"),
        }
    }

    #[test]
    fn test_far_key_is_pruned() {
        let mut idx = index();
        idx.insert("SF", &lng_lat(-122.4194, 37.7749));
        idx.insert("LA", &lng_lat(-118.2437, 34.0522));

        match idx.candidates(&lng_lat(-122.4194, 37.7749), 800.0) {
            Candidates::Keys(keys) => {
                assert!(keys.contains("SF"));
                assert!(!keys.contains("LA"));
            }
            Candidates::Everything => panic!("valid point should be indexed"),
        }
    }

    #[test]
    fn test_radius_is_covered() {
        // A key ~790 m away in each direction must always be a candidate
        let mut idx = index();
        let center = lng_lat(13.4050, 52.5200); // Berlin
        let d = 0.0071; // ~790 m of latitude
        let around = [
            lng_lat(center.x, center.y + d),
            lng_lat(center.x, center.y - d),
            lng_lat(center.x + d * 1.6, center.y),
            lng_lat(center.x - d * 1.6, center.y),
        ];
        for (i, p) in around.iter().enumerate() {
            assert!(distance_meters(Some(&center), Some(p)) < 800.0);
            idx.insert(&format!("K{}", i), p);
        }

        match idx.candidates(&center, 800.0) {
            Candidates::Keys(keys) => assert_eq!(keys.len(), 4),
            Candidates::Everything => panic!("valid point should be indexed"),
        }
    }

    #[test]
    fn test_relocate_and_remove() {
        let mut idx = index();
        let a = lng_lat(2.3522, 48.8566); // Paris
        let b = lng_lat(4.8357, 45.7640); // Lyon
        idx.insert("D", &a);
        idx.relocate("D", &a, &b);

        match idx.candidates(&b, 800.0) {
            Candidates::Keys(keys) => assert!(keys.contains("D")),
            Candidates::Everything => panic!(),
        }
        match idx.candidates(&a, 800.0) {
            Candidates::Keys(keys) => assert!(!keys.contains("D")),
            Candidates::Everything => panic!(),
        }

        idx.remove("D", &b);
        assert!(idx.is_empty());
        assert_eq!(idx.cell_count(), 0);
    }

    #[test]
    fn test_unindexable_points() {
        let mut idx = index();
        let bad = lng_lat(f64::NAN, 10.0);
        idx.insert("N", &bad);
        assert_eq!(idx.len(), 1);

        // Overflow keys are always candidates
        match idx.candidates(&lng_lat(0.0, 0.0), 800.0) {
            Candidates::Keys(keys) => assert!(keys.contains("N")),
            Candidates::Everything => panic!(),
        }
        assert_eq!(idx.candidates(&bad, 800.0), Candidates::Everything);
    }

    #[test]
    fn test_rings_for_radius() {
        let idx = index();
        assert_eq!(idx.rings_for_radius(800.0), 1);
        assert!(idx.rings_for_radius(20_000.0) > 1);
    }

    #[test]
    fn test_large_radius_scans_everything() {
        let mut idx = index();
        idx.insert("A", &lng_lat(2.3522, 48.8566));

        let rings = idx.rings_for_radius(2_000_000.0);
        assert!(ProximityIndex::disk_cells(rings) > MAX_DISK_CELLS);
        assert_eq!(
            idx.candidates(&lng_lat(4.8357, 45.7640), 2_000_000.0),
            Candidates::Everything
        );
    }

    #[test]
    fn test_disk_cells() {
        assert_eq!(ProximityIndex::disk_cells(0), 1);
        assert_eq!(ProximityIndex::disk_cells(1), 7);
        assert_eq!(ProximityIndex::disk_cells(2), 19);
    }
}
