//! # Geographic Utilities
//!
//! Core geographic computation utilities for ping analysis.
//!
//! This module provides the fundamental geographic operations used by the
//! stay-point detector and the path segmenter. All functions expect WGS84
//! coordinates (latitude/longitude in degrees), the standard produced by GPS
//! receivers and location services.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`initial_bearing`] | Initial compass bearing from one point to another |
//! | [`compute_centroid`] | Mean location of a set of points |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`essentially_equal`] | Coordinate-delta equality test for bounce detection |
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! The haversine formula calculates the great-circle distance between two
//! points on a sphere (radius 6,371 km). It is the standard method for GPS
//! distance calculation, accurate to within 0.3% for practical applications.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)
//!
//! ### Bearing
//!
//! [`initial_bearing`] uses the Mercator-projection formulation: the
//! longitude delta is compared against the log-ratio of the projected
//! latitudes, which yields the initial compass direction of travel. The
//! result is normalized to `[0, 360)` degrees.

use crate::GpsPoint;
use geo::{Distance, Haversine, Point};
use std::f64::consts::{FRAC_PI_4, PI};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two points using the Haversine
/// formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a
/// spherical Earth with radius 6,371 km).
///
/// # Example
///
/// ```rust
/// use mobility_miner::{geo_utils, GpsPoint};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Convert meters to approximate degrees at a given latitude.
///
/// At the equator, 1 degree is roughly 111,320 meters; the meters-per-degree
/// of longitude shrink with `cos(latitude)`. The returned value is the larger
/// (longitude) span, which makes it suitable as a conservative search radius
/// for spatial-index pre-filtering.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bearing Functions
// =============================================================================

/// Calculate the initial compass bearing from one point to another.
///
/// Uses the Mercator-projection bearing formula and normalizes the result to
/// `[0, 360)` degrees: 0 = north, 90 = east, 180 = south, 270 = west.
/// Identical points yield a bearing of 0.
///
/// # Example
///
/// ```rust
/// use mobility_miner::{geo_utils, GpsPoint};
///
/// let origin = GpsPoint::new(51.50, -0.12);
/// let north = GpsPoint::new(51.51, -0.12);
///
/// let bearing = geo_utils::initial_bearing(&origin, &north);
/// assert!(bearing.abs() < 0.5);
/// ```
pub fn initial_bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    let mut d_lon = (to.longitude - from.longitude).to_radians();
    let d_phi = ((to.latitude.to_radians() / 2.0 + FRAC_PI_4).tan()
        / (from.latitude.to_radians() / 2.0 + FRAC_PI_4).tan())
    .ln();

    // Take the shorter way around the antimeridian.
    if d_lon.abs() > PI {
        d_lon = if d_lon > 0.0 {
            -(2.0 * PI - d_lon)
        } else {
            2.0 * PI + d_lon
        };
    }

    (d_lon.atan2(d_phi).to_degrees() + 360.0) % 360.0
}

// =============================================================================
// Centroid Functions
// =============================================================================

/// Compute the mean location of a set of points.
///
/// This is a simple arithmetic centroid, suitable for the small geographic
/// areas a stay cluster or visit group covers. Returns (0, 0) for empty
/// input.
///
/// # Example
///
/// ```rust
/// use mobility_miner::{geo_utils, GpsPoint};
///
/// let points = [GpsPoint::new(51.50, -0.10), GpsPoint::new(51.52, -0.12)];
/// let center = geo_utils::compute_centroid(points.iter().copied());
/// assert!((center.latitude - 51.51).abs() < 1e-9);
/// assert!((center.longitude + 0.11).abs() < 1e-9);
/// ```
pub fn compute_centroid<I>(points: I) -> GpsPoint
where
    I: IntoIterator<Item = GpsPoint>,
{
    let mut sum_lat = 0.0;
    let mut sum_lon = 0.0;
    let mut count = 0usize;

    for p in points {
        sum_lat += p.latitude;
        sum_lon += p.longitude;
        count += 1;
    }

    if count == 0 {
        return GpsPoint::new(0.0, 0.0);
    }

    GpsPoint::new(sum_lat / count as f64, sum_lon / count as f64)
}

// =============================================================================
// Equality Functions
// =============================================================================

/// Check whether two points are "essentially equal": both coordinate deltas
/// fall strictly below `epsilon_deg` degrees.
///
/// Used by the path segmenter to recognize A→B→A bounce artifacts, where a
/// device flips between towers and reports a spurious intermediate location.
#[inline]
pub fn essentially_equal(a: &GpsPoint, b: &GpsPoint, epsilon_deg: f64) -> bool {
    (a.latitude - b.latitude).abs() < epsilon_deg && (a.longitude - b.longitude).abs() < epsilon_deg
}

// =============================================================================
// Unit Tests
// =============================================================================
