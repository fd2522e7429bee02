//! # Mobility Miner
//!
//! High-performance stay-point detection and path segmentation for GPS ping
//! streams.
//!
//! This library converts a per-user, time-ordered sequence of geolocated
//! pings into two derived structures used for mobility analysis:
//!
//! - **Stay clusters**: spatial regions where a user repeatedly lingers,
//!   split into temporally-contiguous visit groups and scored for strength
//! - **Paths**: contiguous trajectories chained from consecutive pings,
//!   annotated with per-segment distance, bearing, and speed
//!
//! Clustering is a deliberate single-pass greedy online algorithm: given
//! sorted input it is fully deterministic, and it never merges, splits, or
//! re-anchors clusters after creation.
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel per-user processing with rayon
//! - **`serde`** - Enable serde derives on config and output records
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use mobility_miner::{analyze, partition_pings, AnalysisConfig, Ping};
//!
//! // Six pings at one spot, five minutes apart: a 25-minute stay
//! let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
//! let pings: Vec<Ping> = (0..6)
//!     .map(|i| Ping::new(1, base + Duration::minutes(5 * i), 51.0785, -1.0923, 10))
//!     .collect();
//!
//! let mut participants = partition_pings(pings);
//! let result = analyze(&mut participants, &AnalysisConfig::default());
//!
//! assert_eq!(result.stays.len(), 1);
//! assert!((result.stays[0].duration_minutes - 25.0).abs() < 1e-9);
//! assert!(result.paths.is_empty()); // nobody moved
//! ```

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

pub mod geo_utils;
pub mod paths;
pub mod stay_points;

pub use paths::{path_records, segment_paths, Path, PathRecord};
pub use stay_points::{
    cluster_records, combined_members, detect_stay_clusters, score_visit_group, shared_members,
    split_visit_groups, StayCluster, StayRecord, VisitScores,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use mobility_miner::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Weather enrichment carried on a ping and passed through to the stay
/// output untouched (group means). Ingestion defaults missing fields to
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weather {
    pub max_temp_c: f64,
    pub mean_temp_c: f64,
    pub total_precip_mm: f64,
    pub snow_cm: f64,
}

/// A single geolocated ping. Immutable once ingested.
///
/// `accuracy` is the reported positional accuracy in meters and must be
/// positive; rejecting non-positive values is ingestion's responsibility.
/// The scorer skips any that slip through rather than producing non-finite
/// scores.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ping {
    pub user_id: u64,
    pub timestamp: DateTime<Utc>,
    pub position: GpsPoint,
    pub accuracy: i32,
    /// Optional enrichment, passed through untouched.
    pub building_id: Option<String>,
    pub building_name: Option<String>,
    pub weather: Weather,
}

impl Ping {
    /// Create a ping with no enrichment.
    pub fn new(
        user_id: u64,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        accuracy: i32,
    ) -> Self {
        Self {
            user_id,
            timestamp,
            position: GpsPoint::new(latitude, longitude),
            accuracy,
            building_id: None,
            building_name: None,
            weather: Weather::default(),
        }
    }

    /// Attach building enrichment.
    pub fn with_building(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.building_id = Some(id.into());
        self.building_name = Some(name.into());
        self
    }

    /// Attach weather enrichment.
    pub fn with_weather(mut self, weather: Weather) -> Self {
        self.weather = weather;
        self
    }

    /// Minutes from this ping's timestamp to `later`'s (negative if `later`
    /// is actually earlier).
    pub fn minutes_until(&self, later: &Ping) -> f64 {
        (later.timestamp - self.timestamp).num_milliseconds() as f64 / 60_000.0
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// The scale applied to quantity and temporal scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScoreScale {
    /// Natural logarithm (the default).
    #[default]
    NaturalLog,
    /// Base-10 logarithm.
    Log10,
    /// No scaling.
    Linear,
}

impl ScoreScale {
    /// Apply the scale to a value. Callers clamp the input to `>= 1`, which
    /// keeps the logarithmic variants non-negative.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            ScoreScale::NaturalLog => value.ln(),
            ScoreScale::Log10 => value.log10(),
            ScoreScale::Linear => value,
        }
    }
}

/// Configuration for stay-cluster detection, visit grouping, and scoring.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StayConfig {
    /// Radius of each stay cluster in meters; a ping belongs to a cluster
    /// when it lies strictly within this distance of the anchor.
    /// Default: 50.0
    pub stay_radius: f64,

    /// When true a ping joins every cluster whose radius covers it; when
    /// false (default) only the first matching cluster in creation order.
    pub points_can_exist_in_multiple_stay_points: bool,

    /// Time gap in minutes that splits a cluster's members into separate
    /// visit groups. Default: 50.0
    pub stay_time_diff_cutoff: f64,

    /// Minimum accuracy score a visit group needs to be emitted.
    /// Default: 0.4
    pub min_a_score: f64,

    /// Minimum visit duration in minutes (inclusive). Default: 10.0
    pub min_duration: f64,

    /// Maximum visit duration in minutes (inclusive). Default: 1440.0 (24h)
    pub max_duration: f64,

    /// Minimum number of pings (inclusive) in a visit group. Default: 5
    pub min_group_count: usize,

    /// Relative value of each additional ping in a group. Default: 1.0
    pub quantity_weight: f64,

    /// Relative value of each additional minute spent in a group.
    /// Default: 20.0
    pub temporal_weight: f64,

    /// Accuracy value (meters) that scores exactly 1.0; smaller reported
    /// accuracies score above 1. Default: 20.0
    pub accuracy_goal: f64,

    /// Cap on the accuracy score. Default: 1.25
    pub accuracy_ceiling: f64,

    /// Scale for the quantity score. Default: natural logarithm
    pub quantity_scale: ScoreScale,

    /// Scale for the temporal score. Default: natural logarithm
    pub temporal_scale: ScoreScale,
}

impl Default for StayConfig {
    fn default() -> Self {
        Self {
            stay_radius: 50.0,
            points_can_exist_in_multiple_stay_points: false,
            stay_time_diff_cutoff: 50.0,
            min_a_score: 0.4,
            min_duration: 10.0,
            max_duration: 24.0 * 60.0,
            min_group_count: 5,
            quantity_weight: 1.0,
            temporal_weight: 20.0,
            accuracy_goal: 20.0,
            accuracy_ceiling: 1.25,
            quantity_scale: ScoreScale::NaturalLog,
            temporal_scale: ScoreScale::NaturalLog,
        }
    }
}

/// Configuration for path segmentation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathConfig {
    /// Minimum number of segments (inclusive) a path needs to be committed.
    /// Default: 5
    pub min_segments: usize,

    /// Minimum minutes (exclusive) between consecutive path pings.
    /// Default: 0.5
    pub min_subsequent_time: f64,

    /// Maximum minutes (exclusive) between consecutive path pings.
    /// Default: 20.0
    pub max_subsequent_time: f64,

    /// Minimum meters (exclusive) between consecutive path pings.
    /// Default: 15.0
    pub min_subsequent_distance: f64,

    /// Maximum meters (exclusive) between consecutive path pings.
    /// Default: 200.0
    pub max_subsequent_distance: f64,

    /// Coordinate delta in degrees under which two locations count as the
    /// same place, used to collapse A→B→A bounce artifacts. Default: 0.001
    pub essentially_equals_epsilon: f64,

    /// Whether the path still open when a user's ping stream ends is
    /// committed under the usual minimum-segments rule. Defaults to false:
    /// the open path is dropped, losing an otherwise valid trailing
    /// trajectory. Flip this on to keep it.
    pub commit_trailing_path: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            min_segments: 5,
            min_subsequent_time: 0.5,
            max_subsequent_time: 20.0,
            min_subsequent_distance: 15.0,
            max_subsequent_distance: 200.0,
            essentially_equals_epsilon: 0.001,
            commit_trailing_path: false,
        }
    }
}

/// The full configuration surface, passed by reference into every component.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    pub stay: StayConfig,
    pub path: PathConfig,
}

/// A rejected configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("stay radius must be positive (got {0})")]
    NonPositiveStayRadius(f64),

    #[error("stay time-gap cutoff must not be negative (got {0})")]
    NegativeTimeCutoff(f64),

    #[error("accuracy goal must be positive (got {0})")]
    NonPositiveAccuracyGoal(f64),

    #[error("accuracy ceiling must be positive (got {0})")]
    NonPositiveAccuracyCeiling(f64),

    #[error("visit duration range is inverted ({min} > {max})")]
    InvertedDurationRange { min: f64, max: f64 },

    #[error("subsequent-time gate is inverted ({min} > {max})")]
    InvertedTimeGate { min: f64, max: f64 },

    #[error("subsequent-distance gate is inverted ({min} > {max})")]
    InvertedDistanceGate { min: f64, max: f64 },

    #[error("essentially-equals epsilon must not be negative (got {0})")]
    NegativeEpsilon(f64),
}

impl AnalysisConfig {
    /// Validate the configuration before a batch run.
    ///
    /// The analysis itself has no failure mode (all arithmetic is clamped),
    /// so this is the only fallible operation in the crate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stay = &self.stay;
        if stay.stay_radius <= 0.0 {
            return Err(ConfigError::NonPositiveStayRadius(stay.stay_radius));
        }
        if stay.stay_time_diff_cutoff < 0.0 {
            return Err(ConfigError::NegativeTimeCutoff(stay.stay_time_diff_cutoff));
        }
        if stay.accuracy_goal <= 0.0 {
            return Err(ConfigError::NonPositiveAccuracyGoal(stay.accuracy_goal));
        }
        if stay.accuracy_ceiling <= 0.0 {
            return Err(ConfigError::NonPositiveAccuracyCeiling(stay.accuracy_ceiling));
        }
        if stay.min_duration > stay.max_duration {
            return Err(ConfigError::InvertedDurationRange {
                min: stay.min_duration,
                max: stay.max_duration,
            });
        }

        let path = &self.path;
        if path.min_subsequent_time > path.max_subsequent_time {
            return Err(ConfigError::InvertedTimeGate {
                min: path.min_subsequent_time,
                max: path.max_subsequent_time,
            });
        }
        if path.min_subsequent_distance > path.max_subsequent_distance {
            return Err(ConfigError::InvertedDistanceGate {
                min: path.min_subsequent_distance,
                max: path.max_subsequent_distance,
            });
        }
        if path.essentially_equals_epsilon < 0.0 {
            return Err(ConfigError::NegativeEpsilon(path.essentially_equals_epsilon));
        }

        Ok(())
    }
}

// ============================================================================
// Participants
// ============================================================================

/// One user and everything derived for them: their pings plus the most
/// recently computed stay clusters and paths.
///
/// Every calculation call clears and rebuilds its result from the current
/// point set; results are never updated incrementally.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: u64,
    pings: Vec<Ping>,
    pub stay_clusters: Vec<StayCluster>,
    pub paths: Vec<Path>,
}

impl Participant {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            pings: Vec::new(),
            stay_clusters: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Add a ping to this participant. Arrival order does not matter; pings
    /// are sorted by timestamp before any calculation.
    pub fn add_ping(&mut self, ping: Ping) {
        self.pings.push(ping);
    }

    /// The participant's pings, in their current order.
    pub fn pings(&self) -> &[Ping] {
        &self.pings
    }

    /// Sort the pings by timestamp (stable, so equal timestamps keep their
    /// arrival order).
    pub fn sort_pings(&mut self) {
        self.pings.sort_by_key(|p| p.timestamp);
    }

    /// Recompute the stay clusters from scratch.
    pub fn calculate_stay_clusters(&mut self, config: &StayConfig) {
        self.sort_pings();
        self.stay_clusters = stay_points::detect_stay_clusters(&self.pings, config);
    }

    /// Recompute the paths from scratch.
    pub fn calculate_paths(&mut self, config: &PathConfig) {
        self.sort_pings();
        self.paths = paths::segment_paths(&self.pings, config);
    }
}

/// Partition a flat list of pings into one [`Participant`] per user id,
/// each with its pings sorted by timestamp. Participants are returned in
/// ascending user-id order.
pub fn partition_pings(pings: Vec<Ping>) -> Vec<Participant> {
    let mut by_user: HashMap<u64, Participant> = HashMap::new();

    for ping in pings {
        if !ping.position.is_valid() {
            debug!(
                "user {}: ping at ({}, {}) has out-of-range coordinates",
                ping.user_id, ping.position.latitude, ping.position.longitude
            );
        }
        by_user
            .entry(ping.user_id)
            .or_insert_with_key(|&id| Participant::new(id))
            .add_ping(ping);
    }

    let mut participants: Vec<Participant> = by_user.into_values().collect();
    participants.sort_by_key(|p| p.user_id);
    for participant in &mut participants {
        participant.sort_pings();
    }

    participants
}

// ============================================================================
// Orchestration
// ============================================================================

/// The two output collections of a batch run, in their final deterministic
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisResult {
    /// Stay records sorted by `(user_id, cluster_id, group_id, start)`,
    /// with cluster and group ids renumbered densely per user.
    pub stays: Vec<StayRecord>,
    /// Path records sorted by `(user_id, path_id, point_index)`.
    pub paths: Vec<PathRecord>,
}

/// Run both pipelines for one participant and collect its output.
fn analyze_participant(participant: &mut Participant, config: &AnalysisConfig) -> AnalysisResult {
    participant.calculate_stay_clusters(&config.stay);
    participant.calculate_paths(&config.path);

    let mut local = AnalysisResult::default();
    for cluster in &participant.stay_clusters {
        local
            .stays
            .extend(stay_points::cluster_records(cluster, &config.stay));
    }
    for path in &participant.paths {
        local.paths.extend(paths::path_records(path));
    }
    local
}

/// Analyze every participant sequentially and produce the merged,
/// deterministically ordered output.
///
/// See the crate-level docs for an end-to-end example.
pub fn analyze(participants: &mut [Participant], config: &AnalysisConfig) -> AnalysisResult {
    let started = Instant::now();
    info!("analyzing {} participants", participants.len());

    let mut buffers = Vec::with_capacity(participants.len());
    for participant in participants.iter_mut() {
        buffers.push(analyze_participant(participant, config));
        debug!(
            "user {}: {} clusters, {} paths",
            participant.user_id,
            participant.stay_clusters.len(),
            participant.paths.len()
        );
    }

    let result = finalize(buffers);
    info!(
        "produced {} stay records and {} path records in {:?}",
        result.stays.len(),
        result.paths.len(),
        started.elapsed()
    );
    result
}

/// Analyze participants in parallel, one rayon task per user.
///
/// Each worker fills a private output buffer; the buffers are merged after
/// the parallel phase and the same sequential post-pass as [`analyze`]
/// establishes the final ordering, so the output is identical to the
/// sequential run. The only shared mutable state is a progress counter.
#[cfg(feature = "parallel")]
pub fn analyze_parallel(participants: &mut [Participant], config: &AnalysisConfig) -> AnalysisResult {
    use rayon::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    let started = Instant::now();
    let total = participants.len();
    info!("analyzing {} participants in parallel", total);

    let progress = AtomicUsize::new(0);
    let buffers: Vec<AnalysisResult> = participants
        .par_iter_mut()
        .map(|participant| {
            let local = analyze_participant(participant, config);
            let done = progress.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            if done % 1024 == 0 {
                debug!("{done}/{total} participants processed");
            }
            local
        })
        .collect();

    let result = finalize(buffers);
    info!(
        "produced {} stay records and {} path records in {:?}",
        result.stays.len(),
        result.paths.len(),
        started.elapsed()
    );
    result
}

/// Merge per-participant buffers and run the sequential post-pass: sort both
/// collections and renumber stay ids densely.
fn finalize(buffers: Vec<AnalysisResult>) -> AnalysisResult {
    let mut stays = Vec::new();
    let mut path_rows = Vec::new();
    for mut buffer in buffers {
        stays.append(&mut buffer.stays);
        path_rows.append(&mut buffer.paths);
    }

    let stays = renumber_stay_records(stays);
    path_rows.sort_by(path_record_order);

    AnalysisResult {
        stays,
        paths: path_rows,
    }
}

/// Tuple-key ordering for stay records.
fn stay_record_order(a: &StayRecord, b: &StayRecord) -> Ordering {
    (a.user_id, a.cluster_id, a.group_id, a.start).cmp(&(b.user_id, b.cluster_id, b.group_id, b.start))
}

/// Tuple-key ordering for path records.
fn path_record_order(a: &PathRecord, b: &PathRecord) -> Ordering {
    (a.user_id, a.path_id, a.point_index).cmp(&(b.user_id, b.path_id, b.point_index))
}

/// Sort stay records and close the id gaps left by clusters and groups that
/// were filtered out entirely, producing new records rather than mutating
/// ids in place. Within one user, clusters keep their relative order and are
/// renumbered 0, 1, 2, …; groups likewise within each cluster.
fn renumber_stay_records(mut records: Vec<StayRecord>) -> Vec<StayRecord> {
    records.sort_by(stay_record_order);

    let mut renumbered = Vec::with_capacity(records.len());
    // (user, source cluster id, source group id) of the previous record
    let mut cursor: Option<(u64, u32, u32)> = None;
    let mut dense_cluster = 0u32;
    let mut dense_group = 0u32;

    for record in records {
        match cursor {
            Some((user, cluster, group)) if user == record.user_id => {
                if cluster != record.cluster_id {
                    dense_cluster += 1;
                    dense_group = 0;
                } else if group != record.group_id {
                    dense_group += 1;
                }
            }
            _ => {
                dense_cluster = 0;
                dense_group = 0;
            }
        }
        cursor = Some((record.user_id, record.cluster_id, record.group_id));

        renumbered.push(StayRecord {
            cluster_id: dense_cluster,
            group_id: dense_group,
            ..record
        });
    }

    renumbered
}

// ============================================================================
// Tests
// ============================================================================
