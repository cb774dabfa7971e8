/// Integration tests for the feature pipeline
///
/// Run with: cargo test --test pipeline_tests -- --nocapture

use aqi_forecast::pipeline::calendar::CALENDAR_COLUMNS;
use aqi_forecast::types::RawRecord;
use aqi_forecast::{build_features, PipelineConfig, PipelineError, RawReading, RawTable};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;

fn reading(station: &str, ts: DateTime<Utc>, pm25: Option<f64>, no2: f64) -> RawReading {
    let mut pollutants = HashMap::new();
    pollutants.insert("PM2.5".to_string(), pm25);
    pollutants.insert("NO2".to_string(), Some(no2));
    RawReading {
        station: station.to_string(),
        city: Some("Springfield".to_string()),
        timestamp: ts,
        pollutants,
    }
}

fn record(v: serde_json::Value) -> RawRecord {
    match v {
        serde_json::Value::Object(m) => m,
        other => panic!("expected object, got {}", other),
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 12, 25, 0, 0, 0).unwrap()
}

#[test]
fn test_hourly_round_trip() {
    println!("\n=== Test: Hourly Round Trip ===");
    // 200 hourly rows across a year boundary, every 20th target missing
    let raw: RawTable = (0..200)
        .map(|h| {
            let pm = if h % 20 == 10 { None } else { Some(10.0 + h as f64 * 0.1) };
            reading("A", start() + Duration::hours(h), pm, 5.0)
        })
        .collect();

    let table = build_features(&raw, &PipelineConfig::default()).unwrap();
    assert_eq!(table.len(), 200, "interpolation should recover every target");
    assert_eq!(table.target, "PM25");

    let target = table.target_column().unwrap();
    assert!(target.values.iter().all(|v| v.is_some()), "target still has gaps");
    let pm_at_10 = target.values[10].unwrap();
    assert!((pm_at_10 - 11.0).abs() < 1e-9, "interpolated value {} != 11.0", pm_at_10);
    println!("✓ {} rows, interpolated gap = {:.3}", table.len(), pm_at_10);

    for i in 1..table.len() {
        assert!(table.timestamps[i] >= table.timestamps[i - 1], "timestamps not sorted");
    }
    println!("✓ Timestamps ascending");

    for name in CALENDAR_COLUMNS.iter().chain(["lag_1d", "lag_2d", "lag_3d", "station_A", "NO2"].iter()) {
        assert!(table.column(name).is_some(), "missing column {}", name);
    }
    let lag = table.column("lag_1d").unwrap();
    assert!(lag.values[..24].iter().all(|v| v.is_none()));
    assert_eq!(lag.values[24], target.values[0]);
    assert!(table.station_original.iter().all(|s| s == "A"));
    assert!(table.column("station_A").unwrap().values.iter().all(|v| *v == Some(1.0)));
    println!("✓ Calendar, lag and station columns present");
}

#[test]
fn test_gap_fill_prefers_later_year_over_interpolation() {
    println!("\n=== Test: Same-Hour Gap Fill ===");
    let y2020 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let y2021 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let mut readings = Vec::new();
    for h in 0..48 {
        let pm = if h == 10 { None } else { Some(20.0 + h as f64) };
        readings.push(reading("A", y2020 + Duration::hours(h), pm, 1.0));
    }
    for h in 0..48 {
        readings.push(reading("A", y2021 + Duration::hours(h), Some(50.0 + h as f64), 1.0));
    }
    let raw: RawTable = readings.into_iter().collect();

    let table = build_features(&raw, &PipelineConfig::default()).unwrap();
    let row = table
        .timestamps
        .iter()
        .position(|t| *t == y2020 + Duration::hours(10))
        .unwrap();
    let filled = table.target_column().unwrap().values[row].unwrap();
    assert_eq!(filled, 60.0, "expected the 2021 value for the same calendar hour");
    println!("✓ Gap filled from next year: {}", filled);
}

#[test]
fn test_dedup_and_bad_timestamps() {
    println!("\n=== Test: Dedup and Timestamp Normalization ===");
    let raw = RawTable::new(vec![
        record(json!({"station": "A", "timestamp": "2021-03-01T00:00:00Z", "pollutants": {"PM25": 7.0}})),
        record(json!({"station": "A", "timestamp": "2021-03-01 00:00:00", "pollutants": {"PM25": 99.0}})),
        record(json!({"station": "A", "timestamp": "not a date", "pollutants": {"PM25": 3.0}})),
        record(json!({"station": "A", "timestamp": {"$date": "2021-03-01T01:00:00Z"}, "pollutants": {"PM25": 8.0}})),
        record(json!({"station": "B", "timestamp": "2021-03-01T00:00:00Z", "pollutants": {"PM25": 9.0}})),
    ]);

    let table = build_features(&raw, &PipelineConfig::default()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.stations, vec!["A", "B"]);

    let a_rows = table.station_rows("A");
    let target = table.target_column().unwrap();
    assert_eq!(target.values[a_rows[0]], Some(7.0), "first arrival should win");
    assert_eq!(target.values[a_rows[1]], Some(8.0));
    println!("✓ Duplicates collapsed, unparseable row dropped");

    let one_hot_b = table.column("station_B").unwrap();
    for (i, s) in table.station_original.iter().enumerate() {
        assert_eq!(one_hot_b.values[i], Some(if s == "B" { 1.0 } else { 0.0 }));
    }
    println!("✓ One-hot columns match station_original");
}

#[test]
fn test_missing_target_column_fails() {
    println!("\n=== Test: Missing Target ===");
    let raw: RawTable = (0..10)
        .map(|h| reading("A", start() + Duration::hours(h), Some(1.0), 2.0))
        .collect();
    let cfg = PipelineConfig {
        target: "CO".to_string(),
        ..PipelineConfig::default()
    };
    let err = build_features(&raw, &cfg).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)), "got {:?}", err);
    println!("✓ {}", err);
}

#[test]
fn test_empty_input_fails() {
    let err = build_features(&RawTable::default(), &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)));
    println!("✓ Empty input rejected");
}

#[test]
fn test_input_left_untouched() {
    let raw: RawTable = (0..30)
        .map(|h| reading("A", start() + Duration::hours(h), if h == 5 { None } else { Some(3.0) }, 2.0))
        .collect();
    let before = raw.records.clone();
    build_features(&raw, &PipelineConfig::default()).unwrap();
    assert_eq!(raw.records, before);
    println!("✓ Raw table unchanged");
}
