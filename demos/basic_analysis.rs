//! Basic example of mining stays and paths from a small ping set.
//!
//! Run with: cargo run --example basic_analysis

use chrono::{Duration, TimeZone, Utc};
use mobility_miner::{analyze, partition_pings, AnalysisConfig, PathConfig, Ping};

fn main() {
    env_logger::init();

    let base = Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap();
    let mut pings: Vec<Ping> = Vec::new();

    // User 1: a morning at one building (35 minutes of pings at one spot) ...
    for i in 0..8 {
        pings.push(
            Ping::new(1, base + Duration::minutes(5 * i), 51.0785, -1.0923, 12)
                .with_building("LIB", "Main Library"),
        );
    }

    // ... then a walk across town, ~300m between pings at 10-minute intervals
    for i in 0..7 {
        pings.push(Ping::new(
            1,
            base + Duration::minutes(60 + 10 * i),
            51.0810 + 0.0027 * i as f64,
            -1.0923,
            8,
        ));
    }

    // User 2: two short visits to the same corner, 3 hours apart
    for hour in [0, 3] {
        for i in 0..6 {
            pings.push(Ping::new(
                2,
                base + Duration::minutes(hour * 60 + 4 * i),
                51.0600,
                -1.1000,
                25,
            ));
        }
    }

    let config = AnalysisConfig {
        path: PathConfig {
            max_subsequent_distance: 500.0,
            commit_trailing_path: true,
            ..PathConfig::default()
        },
        ..AnalysisConfig::default()
    };
    config.validate().expect("config is well-formed");

    let mut participants = partition_pings(pings);
    let result = analyze(&mut participants, &config);

    println!("Stay/Visit Output ({} records)\n", result.stays.len());
    for stay in &result.stays {
        println!(
            "  user {} cluster {} group {}: {:.0} min at ({:.4}, {:.4}) combined={:.2} building={}",
            stay.user_id,
            stay.cluster_id,
            stay.group_id,
            stay.duration_minutes,
            stay.centroid_lat,
            stay.centroid_lon,
            stay.combined_score,
            stay.building_name.as_deref().unwrap_or("-"),
        );
    }

    println!("\nPath Output ({} records)\n", result.paths.len());
    for record in &result.paths {
        println!(
            "  user {} path {} point {}: ({:.4}, {:.4}) next={:.0}m in {:.1}min bearing={:.0}° speed={:.0}m/min",
            record.user_id,
            record.path_id,
            record.point_index,
            record.lat,
            record.lon,
            record.distance_to_next,
            record.minutes_to_next,
            record.bearing_segment,
            record.speed,
        );
    }
}
