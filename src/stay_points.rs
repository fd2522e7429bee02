//! # Stay-Point Detection
//!
//! Detects the places where a user repeatedly lingers and scores how strongly
//! each period of lingering registers.
//!
//! ## Algorithm
//! 1. Scan the user's time-sorted pings once, greedily assigning each ping to
//!    the first existing cluster whose anchor lies within `stay_radius`
//!    meters (great-circle), or founding a new cluster when none matches
//! 2. Split each cluster's members into visit groups wherever the time gap
//!    between consecutive pings exceeds `stay_time_diff_cutoff` minutes
//! 3. Score every visit group (quantity, temporal, accuracy, combined) and
//!    drop groups that fail the configured thresholds
//!
//! The detection pass is an online greedy algorithm, not a globally optimal
//! clustering: clusters are never merged, split, or re-anchored, and a ping
//! arriving far from every current anchor always founds a new cluster. Given
//! sorted input the result is fully deterministic.
//!
//! An [`rstar`] R-tree over cluster anchors accelerates the membership test.
//! The tree query uses a conservative degree radius and candidates are
//! confirmed with the exact haversine test in creation order, so the output
//! is identical to a linear scan over all clusters.

use crate::geo_utils::{self, haversine_distance, meters_to_degrees};
use crate::{GpsPoint, Ping, StayConfig, Weather};
use chrono::{DateTime, Utc};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashSet;

/// Safety factor applied to the degree radius of the anchor pre-filter.
/// Covers the spread between the planar degree metric and the spherical
/// distance so the exact test below never loses a candidate.
const PREFILTER_MARGIN: f64 = 2.0;

// =============================================================================
// Stay Clusters
// =============================================================================

/// A spatial region discovered online from a user's pings.
///
/// Membership is decided by great-circle distance to the `anchor` (the
/// location of the ping that founded the cluster), never by the centroid.
/// The anchor is fixed for the lifetime of the cluster.
#[derive(Debug, Clone)]
pub struct StayCluster {
    pub user_id: u64,
    pub cluster_id: u32,
    /// Location of the founding ping. Never recomputed.
    pub anchor: GpsPoint,
    /// Building passthrough from the founding ping.
    pub building_id: Option<String>,
    pub building_name: Option<String>,
    /// Member pings, in the order they were assigned.
    pub members: Vec<Ping>,
}

impl StayCluster {
    fn new(founder: &Ping, cluster_id: u32) -> Self {
        Self {
            user_id: founder.user_id,
            cluster_id,
            anchor: founder.position,
            building_id: founder.building_id.clone(),
            building_name: founder.building_name.clone(),
            members: vec![founder.clone()],
        }
    }

    /// Radius membership test against the fixed anchor (strictly inside).
    pub fn contains(&self, ping: &Ping, radius_m: f64) -> bool {
        haversine_distance(&self.anchor, &ping.position) < radius_m
    }

    /// Mean location of the member pings. Derived on demand; membership
    /// tests never use it.
    pub fn centroid(&self) -> GpsPoint {
        geo_utils::compute_centroid(self.members.iter().map(|p| p.position))
    }

    /// Timestamp of the earliest member ping.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.members.iter().map(|p| p.timestamp).min()
    }

    /// Timestamp of the latest member ping.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.members.iter().map(|p| p.timestamp).max()
    }
}

// =============================================================================
// Anchor Index
// =============================================================================

/// A cluster anchor with its creation index, for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct AnchorEntry {
    cluster_idx: usize,
    lat: f64,
    lon: f64,
}

impl RTreeObject for AnchorEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

impl PointDistance for AnchorEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlon = self.lon - point[1];
        dlat * dlat + dlon * dlon
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Cluster a user's time-sorted pings into stay clusters.
///
/// Single greedy pass, no backtracking. With
/// [`points_can_exist_in_multiple_stay_points`](StayConfig::points_can_exist_in_multiple_stay_points)
/// false (the default) each ping joins only the first matching cluster in
/// creation order; with it true the ping joins every matching cluster.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use mobility_miner::{detect_stay_clusters, Ping, StayConfig};
///
/// let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
/// let pings = vec![
///     Ping::new(7, base, 51.5074, -0.1278, 10),
///     Ping::new(7, base + Duration::minutes(5), 51.5074, -0.1278, 10),
///     Ping::new(7, base + Duration::minutes(10), 48.8566, 2.3522, 10),
/// ];
///
/// let clusters = detect_stay_clusters(&pings, &StayConfig::default());
/// assert_eq!(clusters.len(), 2);
/// assert_eq!(clusters[0].members.len(), 2);
/// ```
pub fn detect_stay_clusters(pings: &[Ping], config: &StayConfig) -> Vec<StayCluster> {
    let mut clusters: Vec<StayCluster> = Vec::new();
    let mut anchors: RTree<AnchorEntry> = RTree::new();

    for ping in pings {
        let radius_deg =
            meters_to_degrees(config.stay_radius, ping.position.latitude) * PREFILTER_MARGIN;
        let query = [ping.position.latitude, ping.position.longitude];

        let mut candidates: Vec<usize> = anchors
            .locate_within_distance(query, radius_deg * radius_deg)
            .map(|entry| entry.cluster_idx)
            .collect();
        // The pre-filter returns candidates in tree order; membership must be
        // resolved in cluster creation order.
        candidates.sort_unstable();

        let mut matched = false;
        for idx in candidates {
            if clusters[idx].contains(ping, config.stay_radius) {
                clusters[idx].members.push(ping.clone());
                matched = true;
                if !config.points_can_exist_in_multiple_stay_points {
                    break;
                }
            }
        }

        if !matched {
            let cluster_idx = clusters.len();
            anchors.insert(AnchorEntry {
                cluster_idx,
                lat: ping.position.latitude,
                lon: ping.position.longitude,
            });
            clusters.push(StayCluster::new(ping, cluster_idx as u32));
        }
    }

    clusters
}

// =============================================================================
// Visit Grouping
// =============================================================================

/// Split a cluster's time-sorted members into temporally-contiguous visit
/// groups.
///
/// The working group closes whenever the gap to the next ping exceeds
/// `cutoff_min` minutes. The final ping always closes the working group, so
/// no trailing group is ever dropped; a cluster whose gaps all stay within
/// the cutoff yields exactly one group.
pub fn split_visit_groups(members: &[Ping], cutoff_min: f64) -> Vec<&[Ping]> {
    let mut groups = Vec::new();
    let mut start = 0;

    for i in 0..members.len() {
        let gap = match members.get(i + 1) {
            Some(next) => members[i].minutes_until(next),
            // The last ping forces a close regardless of the actual gap.
            None => cutoff_min + 1.0,
        };

        if gap > cutoff_min {
            groups.push(&members[start..=i]);
            start = i + 1;
        }
    }

    groups
}

// =============================================================================
// Scoring
// =============================================================================

/// The four strength scores of a visit group.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisitScores {
    pub quantity: f64,
    pub temporal: f64,
    pub accuracy: f64,
    pub combined: f64,
}

/// Minutes between the first and last ping of a group. Empty and
/// single-ping groups have zero duration.
pub fn group_duration_minutes(group: &[Ping]) -> f64 {
    match (group.first(), group.last()) {
        (Some(first), Some(last)) => first.minutes_until(last),
        _ => 0.0,
    }
}

/// Score one visit group.
///
/// Quantity and temporal inputs are clamped to at least 1 so the logarithmic
/// scales never produce a negative or undefined score.
pub fn score_visit_group(group: &[Ping], config: &StayConfig) -> VisitScores {
    let quantity = config
        .quantity_scale
        .apply((group.len() as f64 * config.quantity_weight).max(1.0));
    let temporal = config
        .temporal_scale
        .apply((group_duration_minutes(group) * config.temporal_weight).max(1.0));
    let accuracy = accuracy_score(group, config);

    VisitScores {
        quantity,
        temporal,
        accuracy,
        combined: quantity * temporal * accuracy,
    }
}

/// Mean of `accuracy_goal / accuracy` over the group, capped at
/// `accuracy_ceiling`.
///
/// `accuracy <= 0` is invalid input that ingestion is expected to reject;
/// such pings are excluded here so the mean stays finite. A group with no
/// usable accuracy scores 0.0 and falls to the `min_a_score` filter.
fn accuracy_score(group: &[Ping], config: &StayConfig) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;

    for ping in group.iter().filter(|p| p.accuracy > 0) {
        sum += config.accuracy_goal / f64::from(ping.accuracy);
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }

    (sum / count as f64).min(config.accuracy_ceiling)
}

fn passes_filter(scores: &VisitScores, duration_min: f64, count: usize, config: &StayConfig) -> bool {
    scores.accuracy >= config.min_a_score
        && duration_min >= config.min_duration
        && duration_min <= config.max_duration
        && count >= config.min_group_count
}

// =============================================================================
// Output Records
// =============================================================================

/// One emitted visit group, ready for the serialization collaborator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StayRecord {
    pub user_id: u64,
    pub cluster_id: u32,
    pub group_id: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: f64,
    /// Anchor location of the owning cluster.
    pub anchor_lat: f64,
    pub anchor_lon: f64,
    /// Mean location of the whole cluster.
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    /// Mean location of this visit group only.
    pub group_centroid_lat: f64,
    pub group_centroid_lon: f64,
    pub building_id: Option<String>,
    pub building_name: Option<String>,
    /// Group means of the weather enrichment.
    pub weather: Weather,
    pub quantity_score: f64,
    pub temporal_score: f64,
    pub accuracy_score: f64,
    pub combined_score: f64,
}

/// Generate the output records for one cluster: split into visit groups,
/// score, filter, and number the surviving groups densely in emission order.
///
/// Groups that fail the filter are silently dropped and do not consume a
/// group id.
pub fn cluster_records(cluster: &StayCluster, config: &StayConfig) -> Vec<StayRecord> {
    let mut members = cluster.members.clone();
    members.sort_by_key(|p| p.timestamp);

    let centroid = cluster.centroid();
    let mut records: Vec<StayRecord> = Vec::new();

    for group in split_visit_groups(&members, config.stay_time_diff_cutoff) {
        let duration = group_duration_minutes(group);
        let scores = score_visit_group(group, config);

        if !passes_filter(&scores, duration, group.len(), config) {
            continue;
        }

        // Groups from split_visit_groups are never empty.
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let group_centroid = geo_utils::compute_centroid(group.iter().map(|p| p.position));

        records.push(StayRecord {
            user_id: cluster.user_id,
            cluster_id: cluster.cluster_id,
            group_id: records.len() as u32,
            start: first.timestamp,
            end: last.timestamp,
            duration_minutes: duration,
            anchor_lat: cluster.anchor.latitude,
            anchor_lon: cluster.anchor.longitude,
            centroid_lat: centroid.latitude,
            centroid_lon: centroid.longitude,
            group_centroid_lat: group_centroid.latitude,
            group_centroid_lon: group_centroid.longitude,
            building_id: cluster.building_id.clone(),
            building_name: cluster.building_name.clone(),
            weather: mean_weather(group),
            quantity_score: scores.quantity,
            temporal_score: scores.temporal,
            accuracy_score: scores.accuracy,
            combined_score: scores.combined,
        });
    }

    records
}

fn mean_weather(group: &[Ping]) -> Weather {
    if group.is_empty() {
        return Weather::default();
    }

    let n = group.len() as f64;
    let mut sum = Weather::default();
    for ping in group {
        sum.max_temp_c += ping.weather.max_temp_c;
        sum.mean_temp_c += ping.weather.mean_temp_c;
        sum.total_precip_mm += ping.weather.total_precip_mm;
        sum.snow_cm += ping.weather.snow_cm;
    }

    Weather {
        max_temp_c: sum.max_temp_c / n,
        mean_temp_c: sum.mean_temp_c / n,
        total_precip_mm: sum.total_precip_mm / n,
        snow_cm: sum.snow_cm / n,
    }
}

// =============================================================================
// Cluster Set Operations
// =============================================================================

/// Members of `a` that lie within `radius_m` of both clusters' anchors.
pub fn shared_members(a: &StayCluster, b: &StayCluster, radius_m: f64) -> Vec<Ping> {
    a.members
        .iter()
        .filter(|p| a.contains(p, radius_m) && b.contains(p, radius_m))
        .cloned()
        .collect()
}

/// Deduplicated union of both clusters' members, in first-seen order.
pub fn combined_members(a: &StayCluster, b: &StayCluster) -> Vec<Ping> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for ping in a.members.iter().chain(b.members.iter()) {
        let key = (
            ping.user_id,
            ping.timestamp,
            ping.position.latitude.to_bits(),
            ping.position.longitude.to_bits(),
        );
        if seen.insert(key) {
            merged.push(ping.clone());
        }
    }

    merged
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap()
    }

    fn ping_at(minute: i64, lat: f64, lon: f64) -> Ping {
        Ping::new(1, base() + Duration::minutes(minute), lat, lon, 10)
    }

    fn ping_after(seconds: i64, lat: f64, lon: f64) -> Ping {
        Ping::new(1, base() + Duration::seconds(seconds), lat, lon, 10)
    }

    #[test]
    fn test_first_match_wins() {
        // Two anchors 60m apart; a midpoint ping is within 50m of both
        let config = StayConfig::default();
        let pings = vec![
            ping_at(0, 0.0, 0.0),
            ping_at(5, 0.0, 0.00054), // ~60m east: outside the first radius
            ping_at(10, 0.0, 0.00027), // ~30m east: inside both radii
        ];

        let clusters = detect_stay_clusters(&pings, &config);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[1].members.len(), 1);
    }

    #[test]
    fn test_multi_membership_flag() {
        let config = StayConfig {
            points_can_exist_in_multiple_stay_points: true,
            ..StayConfig::default()
        };
        let pings = vec![
            ping_at(0, 0.0, 0.0),
            ping_at(5, 0.0, 0.00054),
            ping_at(10, 0.0, 0.00027),
        ];

        let clusters = detect_stay_clusters(&pings, &config);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[1].members.len(), 2);
    }

    #[test]
    fn test_every_ping_in_exactly_one_cluster() {
        let config = StayConfig::default();
        let pings: Vec<Ping> = (0..40)
            .map(|i| ping_at(i, (i % 7) as f64 * 0.01, (i % 3) as f64 * 0.01))
            .collect();

        let clusters = detect_stay_clusters(&pings, &config);
        let assigned: usize = clusters.iter().map(|c| c.members.len()).sum();
        assert_eq!(assigned, pings.len());
    }

    #[test]
    fn test_anchor_is_founding_ping_location() {
        let config = StayConfig::default();
        // Second ping is ~30m away and joins; the anchor must stay put
        let pings = vec![ping_at(0, 0.0, 0.0), ping_at(5, 0.0, 0.00027)];

        let clusters = detect_stay_clusters(&pings, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].anchor.latitude, 0.0);
        assert_eq!(clusters[0].anchor.longitude, 0.0);

        // The centroid drifts with the members while the anchor does not
        let centroid = clusters[0].centroid();
        assert!(centroid.longitude > 0.0);
    }

    #[test]
    fn test_detector_deterministic() {
        let config = StayConfig::default();
        let pings: Vec<Ping> = (0..60)
            .map(|i| ping_at(i, (i % 5) as f64 * 0.02, (i % 4) as f64 * 0.02))
            .collect();

        let first = detect_stay_clusters(&pings, &config);
        let second = detect_stay_clusters(&pings, &config);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.cluster_id, b.cluster_id);
            assert_eq!(a.members.len(), b.members.len());
        }
    }

    #[test]
    fn test_split_visit_groups_on_gap() {
        // Gap of 95 minutes between minute 5 and minute 100
        let members = vec![
            ping_at(0, 0.0, 0.0),
            ping_at(5, 0.0, 0.0),
            ping_at(100, 0.0, 0.0),
            ping_at(105, 0.0, 0.0),
        ];

        let groups = split_visit_groups(&members, 50.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_split_visit_groups_single_group() {
        let members: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();
        let groups = split_visit_groups(&members, 50.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 6);
    }

    #[test]
    fn test_split_visit_groups_last_ping_closes() {
        let members = vec![ping_at(0, 0.0, 0.0)];
        let groups = split_visit_groups(&members, 50.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn test_split_visit_groups_empty() {
        let groups = split_visit_groups(&[], 50.0);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_scores_six_ping_stay() {
        let config = StayConfig::default();
        let group: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();

        let scores = score_visit_group(&group, &config);
        assert!((scores.quantity - 6.0_f64.ln()).abs() < 1e-12);
        // 25 minutes * weight 20 = 500
        assert!((scores.temporal - 500.0_f64.ln()).abs() < 1e-12);
        // goal 20 / accuracy 10 = 2.0, capped at the 1.25 ceiling
        assert!((scores.accuracy - 1.25).abs() < 1e-12);
        assert!(
            (scores.combined - scores.quantity * scores.temporal * scores.accuracy).abs() < 1e-12
        );
    }

    #[test]
    fn test_accuracy_uncapped_below_ceiling() {
        let config = StayConfig {
            accuracy_ceiling: 3.0,
            ..StayConfig::default()
        };
        let group: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();

        let scores = score_visit_group(&group, &config);
        assert!((scores.accuracy - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_clamps_keep_results_finite() {
        let config = StayConfig::default();
        // A single ping has zero duration; both log arguments clamp to 1
        let group = vec![ping_at(0, 0.0, 0.0)];

        let scores = score_visit_group(&group, &config);
        assert_eq!(scores.quantity, 0.0);
        assert_eq!(scores.temporal, 0.0);
        assert!(scores.combined.is_finite());
    }

    #[test]
    fn test_accuracy_score_skips_non_positive() {
        let config = StayConfig::default();
        let mut good = ping_at(0, 0.0, 0.0);
        good.accuracy = 10;
        let mut zero = ping_at(5, 0.0, 0.0);
        zero.accuracy = 0;
        let mut negative = ping_at(10, 0.0, 0.0);
        negative.accuracy = -4;

        let scores = score_visit_group(&[good, zero, negative], &config);
        // Only the accuracy-10 ping contributes: 20/10 = 2.0, capped at 1.25
        assert!((scores.accuracy - 1.25).abs() < 1e-12);
        assert!(scores.accuracy.is_finite());
    }

    #[test]
    fn test_accuracy_score_all_invalid_is_zero() {
        let config = StayConfig::default();
        let mut a = ping_at(0, 0.0, 0.0);
        a.accuracy = 0;
        let mut b = ping_at(5, 0.0, 0.0);
        b.accuracy = -1;

        let scores = score_visit_group(&[a, b], &config);
        assert_eq!(scores.accuracy, 0.0);
        assert_eq!(scores.combined, 0.0);
    }

    #[test]
    fn test_cluster_records_end_to_end() {
        let config = StayConfig::default();
        let pings: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();
        let clusters = detect_stay_clusters(&pings, &config);
        assert_eq!(clusters.len(), 1);

        let records = cluster_records(&clusters[0], &config);
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.user_id, 1);
        assert_eq!(record.cluster_id, 0);
        assert_eq!(record.group_id, 0);
        assert_eq!(clusters[0].start(), Some(record.start));
        assert_eq!(clusters[0].end(), Some(record.end));
        assert!((record.duration_minutes - 25.0).abs() < 1e-9);
        assert!((record.quantity_score - 6.0_f64.ln()).abs() < 1e-12);
        assert!((record.accuracy_score - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_duration_boundaries_inclusive() {
        // duration == min_duration (10) with exactly min_group_count pings
        let config = StayConfig::default();
        let group: Vec<Ping> = (0..5).map(|i| ping_after(i * 150, 0.0, 0.0)).collect();
        assert!((group_duration_minutes(&group) - 10.0).abs() < 1e-9);

        let cluster = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: GpsPoint::new(0.0, 0.0),
            building_id: None,
            building_name: None,
            members: group,
        };
        assert_eq!(cluster_records(&cluster, &config).len(), 1);

        // duration == max_duration passes too
        let capped = StayConfig {
            max_duration: 25.0,
            ..StayConfig::default()
        };
        let members: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();
        let cluster = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: GpsPoint::new(0.0, 0.0),
            building_id: None,
            building_name: None,
            members,
        };
        assert_eq!(cluster_records(&cluster, &capped).len(), 1);
    }

    #[test]
    fn test_weak_groups_dropped_silently() {
        let config = StayConfig::default();
        // Two pings: fails min_group_count (5) and min_duration (10)
        let pings = vec![ping_at(0, 0.0, 0.0), ping_at(5, 0.0, 0.0)];
        let clusters = detect_stay_clusters(&pings, &config);

        let records = cluster_records(&clusters[0], &config);
        assert!(records.is_empty());
    }

    #[test]
    fn test_group_ids_dense_after_filter() {
        // Three visit groups; the middle one is too small to survive
        let config = StayConfig::default();
        let mut members: Vec<Ping> = (0..6).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();
        members.extend((0..2).map(|i| ping_at(200 + i * 5, 0.0, 0.0)));
        members.extend((0..6).map(|i| ping_at(400 + i * 5, 0.0, 0.0)));

        let cluster = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: GpsPoint::new(0.0, 0.0),
            building_id: None,
            building_name: None,
            members,
        };

        let records = cluster_records(&cluster, &config);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].group_id, 0);
        assert_eq!(records[1].group_id, 1);
    }

    #[test]
    fn test_group_centroid_differs_from_cluster_centroid() {
        let config = StayConfig {
            min_group_count: 2,
            min_duration: 0.0,
            ..StayConfig::default()
        };
        // Two visit groups at slightly different spots inside one radius
        let mut members: Vec<Ping> = (0..3).map(|i| ping_at(i * 5, 0.0, 0.0)).collect();
        members.extend((0..3).map(|i| ping_at(200 + i * 5, 0.0002, 0.0)));

        let cluster = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: GpsPoint::new(0.0, 0.0),
            building_id: None,
            building_name: None,
            members,
        };

        let records = cluster_records(&cluster, &config);
        assert_eq!(records.len(), 2);
        assert!(records[0].group_centroid_lat < records[1].group_centroid_lat);
        assert_eq!(records[0].centroid_lat, records[1].centroid_lat);
    }

    #[test]
    fn test_weather_means_carried_through() {
        let config = StayConfig::default();
        let members: Vec<Ping> = (0..6)
            .map(|i| {
                ping_at(i * 5, 0.0, 0.0).with_weather(Weather {
                    max_temp_c: i as f64,
                    mean_temp_c: 10.0,
                    total_precip_mm: 2.0,
                    snow_cm: 0.0,
                })
            })
            .collect();

        let cluster = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: GpsPoint::new(0.0, 0.0),
            building_id: None,
            building_name: None,
            members,
        };

        let records = cluster_records(&cluster, &config);
        assert_eq!(records.len(), 1);
        assert!((records[0].weather.max_temp_c - 2.5).abs() < 1e-12);
        assert!((records[0].weather.mean_temp_c - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_shared_and_combined_members() {
        let radius = 50.0;
        let founder_a = ping_at(0, 0.0, 0.0);
        let founder_b = ping_at(5, 0.0, 0.00054);
        let between = ping_at(10, 0.0, 0.00027);

        let a = StayCluster {
            user_id: 1,
            cluster_id: 0,
            anchor: founder_a.position,
            building_id: None,
            building_name: None,
            members: vec![founder_a.clone(), between.clone()],
        };
        let b = StayCluster {
            user_id: 1,
            cluster_id: 1,
            anchor: founder_b.position,
            building_id: None,
            building_name: None,
            members: vec![founder_b.clone(), between.clone()],
        };

        let shared = shared_members(&a, &b, radius);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].timestamp, between.timestamp);

        let combined = combined_members(&a, &b);
        assert_eq!(combined.len(), 3);
    }
}
