/// Integration tests for the year-holdout trainer
///
/// Run with: cargo test --test training_tests -- --nocapture

use aqi_forecast::trainer::{self, split_by_year};
use aqi_forecast::{build_features, ForestConfig, PipelineConfig, PipelineError, RawReading, RawTable, Regressor};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::HashMap;

fn small_forest() -> ForestConfig {
    ForestConfig {
        n_trees: 8,
        max_depth: 6,
        min_samples_leaf: 2,
        seed: 7,
    }
}

/// Readings every `step_hours` from `from`, with a daily and seasonal cycle.
fn readings(from: DateTime<Utc>, count: i64, step_hours: i64) -> RawTable {
    (0..count)
        .map(|k| {
            let ts = from + Duration::hours(k * step_hours);
            let daily = (ts.hour() as f64 / 24.0 * std::f64::consts::TAU).sin() * 10.0;
            let seasonal = if ts.month() <= 2 || ts.month() >= 11 { 30.0 } else { 10.0 };
            let mut pollutants = HashMap::new();
            pollutants.insert("PM25".to_string(), Some(40.0 + daily + seasonal));
            pollutants.insert("NO2".to_string(), Some(12.0 + daily * 0.5));
            RawReading {
                station: "Central".to_string(),
                city: None,
                timestamp: ts,
                pollutants,
            }
        })
        .collect()
}

#[test]
fn test_forward_holdout_split() {
    println!("\n=== Test: Forward Holdout 2020-2022 ===");
    let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let raw = readings(from, 3 * 730, 12);
    let table = build_features(&raw, &PipelineConfig::default()).unwrap();

    let split = split_by_year(&table);
    assert_eq!(split.test_year, Some(2022));
    assert!(split.train.iter().all(|&r| table.timestamps[r].year() < 2022));
    assert!(split.test.iter().all(|&r| table.timestamps[r].year() == 2022));
    assert_eq!(split.train.len() + split.test.len(), table.len());
    println!("✓ train={} test={}", split.train.len(), split.test.len());

    let trained = trainer::train(&table, &PipelineConfig::default(), &small_forest()).unwrap();
    let m = &trained.metrics;
    // The first 72 rows have no lag_3d and are skipped
    assert_eq!(m.train_rows, split.train.len() - 72);
    assert_eq!(m.test_rows, split.test.len());
    assert_eq!(m.test_year, Some(2022));
    assert!(m.test_r2.is_some());
    assert!(m.rmse.unwrap() >= 0.0);
    assert!(m.train_r2.unwrap() > 0.5, "train r2 too low: {:?}", m.train_r2);
    println!("✓ train_r2={:?} test_r2={:?} rmse={:?}", m.train_r2, m.test_r2, m.rmse);

    assert!(!trained.schema.columns.contains(&"PM25".to_string()));
    assert_eq!(trained.model.n_features(), trained.schema.width());
    println!("✓ Schema excludes target, width {}", trained.schema.width());
}

#[test]
fn test_single_year_reports_absent_metrics() {
    println!("\n=== Test: Single-Year Dataset ===");
    let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let raw = readings(from, 400, 6);
    let table = build_features(&raw, &PipelineConfig::default()).unwrap();

    let trained = trainer::train(&table, &PipelineConfig::default(), &small_forest()).unwrap();
    assert_eq!(trained.metrics.test_year, None);
    assert_eq!(trained.metrics.test_rows, 0);
    assert_eq!(trained.metrics.test_r2, None);
    assert_eq!(trained.metrics.rmse, None);
    assert!(trained.metrics.train_rows > 0);

    let json = serde_json::to_value(&trained.metrics).unwrap();
    assert!(json["rmse"].is_null(), "absent metrics must serialize as null, not 0");
    println!("✓ Holdout metrics absent: {}", json);
}

#[test]
fn test_too_short_history_is_insufficient() {
    println!("\n=== Test: No Complete Training Rows ===");
    let from = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let raw = readings(from, 40, 1);
    let table = build_features(&raw, &PipelineConfig::default()).unwrap();

    let err = trainer::train(&table, &PipelineConfig::default(), &small_forest()).err().unwrap();
    assert!(matches!(err, PipelineError::InsufficientData(_)), "got {:?}", err);
    println!("✓ {}", err);
}

#[test]
fn test_training_is_deterministic() {
    let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let raw = readings(from, 300, 6);
    let table = build_features(&raw, &PipelineConfig::default()).unwrap();

    let a = trainer::train(&table, &PipelineConfig::default(), &small_forest()).unwrap();
    let b = trainer::train(&table, &PipelineConfig::default(), &small_forest()).unwrap();
    assert_eq!(a.model, b.model);

    let row = a.schema.table_row(&table, table.len() - 1).unwrap();
    assert_eq!(a.model.predict_row(&row).unwrap(), b.model.predict_row(&row).unwrap());
    println!("✓ Same seed, same forest");
}
