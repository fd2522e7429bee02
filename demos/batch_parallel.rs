//! Example of analyzing many users in parallel.
//!
//! Run with: cargo run --example batch_parallel --features parallel

use chrono::{Duration, TimeZone, Utc};
use mobility_miner::{analyze_parallel, partition_pings, AnalysisConfig, PathConfig, Ping};
use std::time::Instant;

fn main() {
    env_logger::init();

    let base = Utc.with_ymd_and_hms(2024, 3, 4, 7, 0, 0).unwrap();
    let mut pings: Vec<Ping> = Vec::new();

    // Synthesize 500 users spread across a grid. Each gets a morning stay,
    // a walk, and an afternoon stay.
    for user in 0..500u64 {
        let home_lat = 45.0 + (user % 25) as f64 * 0.05;
        let home_lon = 10.0 + (user / 25) as f64 * 0.05;

        for i in 0..8 {
            pings.push(Ping::new(
                user,
                base + Duration::minutes(5 * i),
                home_lat,
                home_lon,
                10 + (user % 15) as i32,
            ));
        }

        for i in 0..10 {
            pings.push(Ping::new(
                user,
                base + Duration::minutes(60 + 8 * i),
                home_lat + 0.0020 * i as f64,
                home_lon,
                10,
            ));
        }

        for i in 0..8 {
            pings.push(Ping::new(
                user,
                base + Duration::minutes(180 + 5 * i),
                home_lat + 0.02,
                home_lon,
                10,
            ));
        }
    }

    println!("Synthesized {} pings for 500 users\n", pings.len());

    let config = AnalysisConfig {
        path: PathConfig {
            max_subsequent_distance: 500.0,
            ..PathConfig::default()
        },
        ..AnalysisConfig::default()
    };

    let mut participants = partition_pings(pings);

    let start = Instant::now();
    let result = analyze_parallel(&mut participants, &config);
    let elapsed = start.elapsed();

    println!("Analysis completed in {:?}\n", elapsed);

    // Stats
    let stay_users: std::collections::HashSet<u64> =
        result.stays.iter().map(|r| r.user_id).collect();
    let path_count = result
        .paths
        .iter()
        .filter(|r| r.point_index == 0)
        .count();

    println!("Stats:");
    println!("  Stay records: {}", result.stays.len());
    println!("  Users with at least one stay: {}", stay_users.len());
    println!("  Path records: {}", result.paths.len());
    println!("  Committed paths: {}", path_count);
}
