//! Feature pipeline: raw readings in, per-station feature matrix out.
//!
//! Stages run in a fixed order:
//!
//! 1. timestamp normalization (unparseable rows dropped)
//! 2. dedup on (station, timestamp), first arrival wins
//! 3. pollutant unnesting, name normalization, numeric coercion
//! 4. all-missing column / row pruning
//! 5. same-calendar-hour fill from later years
//! 6. linear interpolation, extended at both ends
//! 7. IQR clipping of every numeric column
//! 8. ascending sort by timestamp
//! 9. calendar fields and seasonal weights
//! 10. target lags
//! 11. drop rows whose target is still missing
//! 12. `station_original` passthrough and one-hot station columns

pub mod calendar;
pub mod clip;
pub mod extract;
pub mod impute;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::RawTable;
use chrono::{DateTime, Utc};

pub const STATION_PREFIX: &str = "station_";
/// Label for every row when the source carries no station field at all.
pub const UNKNOWN_STATION: &str = "unknown";

/// One-hot indicator column name for a station label.
pub fn one_hot_column(station: &str) -> String {
    format!("{}{}", STATION_PREFIX, station)
}

/// A named numeric column; `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: String, values: Vec<Option<f64>>) -> Self {
        Self { name, values }
    }
}

/// Working table used while cleaning, one entry per row in each vector.
#[derive(Debug, Clone, Default)]
pub(crate) struct Frame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub stations: Vec<Option<String>>,
    pub cities: Vec<Option<String>>,
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// New frame holding `rows`, in that order.
    pub fn select(&self, rows: &[usize]) -> Frame {
        Frame {
            timestamps: rows.iter().map(|&r| self.timestamps[r]).collect(),
            stations: rows.iter().map(|&r| self.stations[r].clone()).collect(),
            cities: rows.iter().map(|&r| self.cities[r].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), rows.iter().map(|&r| c.values[r]).collect()))
                .collect(),
        }
    }
}

/// Cleaned, enriched feature matrix. Rows are in ascending timestamp order.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub timestamps: Vec<DateTime<Utc>>,
    /// Station label per row; used for filtering, never fed to the model.
    pub station_original: Vec<String>,
    /// Numeric columns: pollutants, calendar, weights, lags, one-hot stations.
    pub columns: Vec<Column>,
    pub target: String,
    /// One-hot vocabulary, sorted.
    pub stations: Vec<String>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn target_column(&self) -> Result<&Column> {
        self.column(&self.target)
            .ok_or_else(|| PipelineError::Data(format!("target column {} not in feature table", self.target)))
    }

    /// Row indices for one station, in ascending time order.
    pub fn station_rows(&self, station: &str) -> Vec<usize> {
        self.station_original
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_str() == station)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Run the full pipeline. The input is not modified.
pub fn build_features(raw: &RawTable, config: &PipelineConfig) -> Result<FeatureTable> {
    let target = extract::canonical_name(&config.target);
    let mut frame = extract::extract_frame(raw)?;
    if frame.column(&target).is_none() {
        let available: Vec<&str> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        return Err(PipelineError::Data(format!(
            "target column {} not found; available columns: {:?}",
            target, available
        )));
    }

    let gap_filled = impute::fill_future(&mut frame, config.max_years);
    let interpolated = impute::interpolate(&mut frame);
    let clipped: usize = frame
        .columns
        .iter_mut()
        .map(|c| clip::clip_column(&mut c.values))
        .sum();
    tracing::debug!(gap_filled, interpolated, clipped, "imputed and clipped");

    let mut order: Vec<usize> = (0..frame.len()).collect();
    order.sort_by_key(|&r| frame.timestamps[r]);
    let frame = frame.select(&order);

    let mut columns = frame.columns.clone();
    let calendar: Vec<calendar::CalendarFeatures> = frame
        .timestamps
        .iter()
        .map(|ts| calendar::CalendarFeatures::at(*ts))
        .collect();
    for (i, name) in calendar::CALENDAR_COLUMNS.iter().enumerate() {
        let values = calendar.iter().map(|c| Some(c.entries()[i].1)).collect();
        columns.push(Column::new(name.to_string(), values));
    }

    let target_values = frame
        .column(&target)
        .map(|c| c.values.clone())
        .unwrap_or_default();
    let groups = impute::station_groups(&frame);
    for (name, hours) in &config.lags {
        let shift = (*hours).max(0) as usize;
        let mut lagged = vec![None; frame.len()];
        for rows in &groups {
            for (k, &row) in rows.iter().enumerate().skip(shift) {
                lagged[row] = target_values[rows[k - shift]];
            }
        }
        columns.push(Column::new(name.clone(), lagged));
    }

    let keep: Vec<usize> = (0..frame.len()).filter(|&r| target_values[r].is_some()).collect();
    let dropped = frame.len() - keep.len();

    let station_original: Vec<String> = keep
        .iter()
        .map(|&r| frame.stations[r].clone().unwrap_or_else(|| UNKNOWN_STATION.to_string()))
        .collect();
    let mut stations: Vec<String> = station_original.clone();
    stations.sort();
    stations.dedup();

    let mut columns: Vec<Column> = columns
        .into_iter()
        .map(|c| Column::new(c.name, keep.iter().map(|&r| c.values[r]).collect()))
        .collect();
    for station in &stations {
        let values = station_original
            .iter()
            .map(|s| Some(if s == station { 1.0 } else { 0.0 }))
            .collect();
        columns.push(Column::new(one_hot_column(station), values));
    }

    let table = FeatureTable {
        timestamps: keep.iter().map(|&r| frame.timestamps[r]).collect(),
        station_original,
        columns,
        target,
        stations,
    };
    tracing::info!(
        rows = table.len(),
        columns = table.columns.len(),
        stations = table.stations.len(),
        dropped_missing_target = dropped,
        "feature table built"
    );
    Ok(table)
}
