//! Great-circle helpers on WGS84 longitude/latitude pairs.
//!
//! Coordinates are `geo::Coord<f64>` with `x` = longitude and `y` = latitude,
//! both in degrees, matching the GeoJSON ordering of the feed.

use geo::Coord;

/// A longitude/latitude pair in degrees.
pub type Coordinate = Coord<f64>;

/// Mean Earth radius used for all distance calculations (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Build a coordinate from longitude and latitude.
#[inline]
pub fn lng_lat(lng: f64, lat: f64) -> Coordinate {
    Coord { x: lng, y: lat }
}

/// Great-circle (haversine) distance in meters.
///
/// Returns `f64::INFINITY` when either side is absent, so "no position"
/// never wins a nearest-neighbour comparison.
pub fn distance_meters(a: Option<&Coordinate>, b: Option<&Coordinate>) -> f64 {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return f64::INFINITY,
    };

    let d_lat = (b.y - a.y).to_radians();
    let d_lng = (b.x - a.x).to_radians();
    let s1 = (d_lat / 2.0).sin();
    let s2 = (d_lng / 2.0).sin();

    let h = s1 * s1 + a.y.to_radians().cos() * b.y.to_radians().cos() * s2 * s2;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Total length of a polyline in meters.
pub fn path_length_meters<'a, I>(points: I) -> f64
where
    I: IntoIterator<Item = &'a Coordinate>,
{
    let mut total = 0.0;
    let mut prev: Option<&Coordinate> = None;
    for p in points {
        if prev.is_some() {
            total += distance_meters(prev, Some(p));
        }
        prev = Some(p);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_same_point_is_zero() {
        let p = lng_lat(24.9384, 60.1699);
        assert_eq!(distance_meters(Some(&p), Some(&p)), 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // One degree of arc on a 6371 km sphere
        let a = lng_lat(0.0, 0.0);
        let b = lng_lat(0.0, 1.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert_relative_eq!(distance_meters(Some(&a), Some(&b)), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = lng_lat(34.7818, 32.0853);
        let b = lng_lat(35.2137, 31.7683);
        assert_relative_eq!(
            distance_meters(Some(&a), Some(&b)),
            distance_meters(Some(&b), Some(&a)),
            epsilon = 1e-9
        );
        // Tel Aviv to Jerusalem, roughly 54 km
        let d = distance_meters(Some(&a), Some(&b));
        assert!(d > 50_000.0 && d < 58_000.0, "got {}", d);
    }

    #[test]
    fn test_distance_missing_side_is_infinite() {
        let a = lng_lat(1.0, 1.0);
        assert!(distance_meters(None, Some(&a)).is_infinite());
        assert!(distance_meters(Some(&a), None).is_infinite());
        assert!(distance_meters(None, None).is_infinite());
    }

    #[test]
    fn test_path_length() {
        let pts = vec![lng_lat(0.0, 0.0), lng_lat(0.0, 1.0), lng_lat(0.0, 2.0)];
        let one_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert_relative_eq!(path_length_meters(&pts), 2.0 * one_degree, epsilon = 1e-6);
        assert_eq!(path_length_meters(&pts[..1]), 0.0);
    }
}
