//! # Path Segmentation & Kinematics
//!
//! Chains a user's time-sorted pings into contiguous paths and derives
//! per-segment distance, bearing, and speed for the committed ones.
//!
//! A candidate ping extends the current path only when both the elapsed time
//! and the great-circle distance from the last accepted ping fall strictly
//! inside the configured gates. A rejection finishes the current path
//! (committed when it carries at least `min_segments` segments, discarded
//! otherwise) and starts a new path at the rejected ping.
//!
//! Paths pass through three states: open while under construction, then
//! committed or discarded on the rejection that finishes them. A path still
//! open when the ping stream ends is dropped unless
//! [`PathConfig::commit_trailing_path`](crate::PathConfig::commit_trailing_path)
//! says otherwise.

use crate::geo_utils::{essentially_equal, haversine_distance, initial_bearing};
use crate::{PathConfig, Ping};
use chrono::{DateTime, Utc};

// =============================================================================
// Paths
// =============================================================================

/// A contiguous trajectory: pings chained by distance and time gating.
#[derive(Debug, Clone)]
pub struct Path {
    pub user_id: u64,
    pub path_id: u32,
    /// Accepted pings in travel order.
    pub points: Vec<Ping>,
}

impl Path {
    fn new(start: &Ping, path_id: u32) -> Self {
        Self {
            user_id: start.user_id,
            path_id,
            points: vec![start.clone()],
        }
    }

    /// Number of segments between consecutive accepted pings.
    pub fn segments(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Try to append `candidate`, gated on time and distance from the last
    /// accepted ping (all bounds strict). Returns whether the candidate was
    /// consumed by this path.
    fn try_add(&mut self, candidate: &Ping, config: &PathConfig) -> bool {
        let last = match self.points.last() {
            Some(p) => p,
            None => return false,
        };

        let time_diff = last.minutes_until(candidate);
        let dist_diff = haversine_distance(&last.position, &candidate.position);

        let accepted = time_diff > config.min_subsequent_time
            && time_diff < config.max_subsequent_time
            && dist_diff > config.min_subsequent_distance
            && dist_diff < config.max_subsequent_distance;
        if !accepted {
            return false;
        }

        self.points.push(candidate.clone());

        // A -> B -> A' with A essentially equal to A' is a bounce artifact
        // (e.g. a tower hand-off); drop the intermediate ping so the path
        // keeps its length and continues from A'.
        let n = self.points.len();
        if n > 2
            && essentially_equal(
                &self.points[n - 3].position,
                &self.points[n - 1].position,
                config.essentially_equals_epsilon,
            )
        {
            self.points.remove(n - 2);
        }

        true
    }
}

// =============================================================================
// Segmentation
// =============================================================================

/// Chain a user's time-sorted pings into committed paths.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use mobility_miner::{segment_paths, PathConfig, Ping};
///
/// let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
/// // Seven pings walking north ~300m apart at 10-minute intervals,
/// // then a 1km jump that breaks the chain
/// let mut pings: Vec<Ping> = (0..7)
///     .map(|i| Ping::new(3, base + Duration::minutes(10 * i), 0.0027 * i as f64, 0.0, 10))
///     .collect();
/// pings.push(Ping::new(3, base + Duration::minutes(70), 0.0027 * 6.0 + 0.009, 0.0, 10));
///
/// let config = PathConfig {
///     max_subsequent_distance: 500.0,
///     ..PathConfig::default()
/// };
/// let paths = segment_paths(&pings, &config);
/// assert_eq!(paths.len(), 1);
/// assert_eq!(paths[0].segments(), 6);
/// ```
pub fn segment_paths(pings: &[Ping], config: &PathConfig) -> Vec<Path> {
    let mut paths: Vec<Path> = Vec::new();
    let mut current: Option<Path> = None;

    for ping in pings {
        let path = match current.as_mut() {
            Some(path) => path,
            None => {
                current = Some(Path::new(ping, paths.len() as u32));
                continue;
            }
        };

        if !path.try_add(ping, config) {
            if let Some(finished) = current.take() {
                if finished.segments() >= config.min_segments {
                    paths.push(finished);
                }
            }
            current = Some(Path::new(ping, paths.len() as u32));
        }
    }

    // The path still open when the stream ends is dropped by default; the
    // switch preserves it under the usual minimum-segments rule.
    if config.commit_trailing_path {
        if let Some(finished) = current.take() {
            if finished.segments() >= config.min_segments {
                paths.push(finished);
            }
        }
    }

    paths
}

// =============================================================================
// Kinematics
// =============================================================================

/// One output row per ping of a committed path, carrying the derived
/// kinematics toward the *next* ping. The last ping of a path has all
/// to-next fields zeroed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathRecord {
    pub user_id: u64,
    pub path_id: u32,
    pub point_index: u32,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Great-circle meters to the next ping.
    pub distance_to_next: f64,
    pub minutes_to_next: f64,
    /// The previous record's minutes-to-next; 0 for the first ping.
    pub minutes_from_last: f64,
    /// Bearing from the path's first to its last ping; constant per path.
    pub bearing_path: f64,
    /// Bearing to the next ping.
    pub bearing_segment: f64,
    /// Meters per minute to the next ping; 0 when no time elapses.
    pub speed: f64,
}

/// Derive the kinematics records for one committed path.
pub fn path_records(path: &Path) -> Vec<PathRecord> {
    let (Some(first), Some(last)) = (path.points.first(), path.points.last()) else {
        return Vec::new();
    };
    let bearing_path = initial_bearing(&first.position, &last.position);

    let mut records: Vec<PathRecord> = Vec::with_capacity(path.points.len());

    for (i, point) in path.points.iter().enumerate() {
        let next = path.points.get(i + 1);

        let distance_to_next =
            next.map_or(0.0, |n| haversine_distance(&point.position, &n.position));
        let minutes_to_next = next.map_or(0.0, |n| point.minutes_until(n));
        let bearing_segment = next.map_or(0.0, |n| initial_bearing(&point.position, &n.position));
        let minutes_from_last = records.last().map_or(0.0, |prev| prev.minutes_to_next);
        // Guard the division: co-timestamped pings must not yield infinity
        let speed = if minutes_to_next > 0.0 {
            distance_to_next / minutes_to_next
        } else {
            0.0
        };

        records.push(PathRecord {
            user_id: path.user_id,
            path_id: path.path_id,
            point_index: i as u32,
            timestamp: point.timestamp,
            lat: point.position.latitude,
            lon: point.position.longitude,
            distance_to_next,
            minutes_to_next,
            minutes_from_last,
            bearing_path,
            bearing_segment,
            speed,
        });
    }

    records
}

// =============================================================================
// Unit Tests
// =============================================================================
