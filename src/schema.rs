//! Ordered feature schema shared by the trainer and the forecast engine.

use crate::error::{PipelineError, Result};
use crate::pipeline::{calendar::CALENDAR_COLUMNS, one_hot_column, FeatureTable, STATION_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The exact model input layout: column order, the one-hot station
/// vocabulary, and fill values for columns that cannot be synthesized at
/// forecast time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub target: String,
    pub columns: Vec<String>,
    pub stations: Vec<String>,
    /// Lag columns and their offsets in hours.
    pub lags: Vec<(String, i64)>,
    /// Training-row mean for every column the forecast engine can't derive;
    /// 0.0 for one-hot columns.
    pub defaults: BTreeMap<String, f64>,
}

impl FeatureSchema {
    /// Every numeric column except the target, in table order. `defaults`
    /// are averaged over `rows`.
    pub fn from_table(table: &FeatureTable, rows: &[usize], lags: &[(String, i64)]) -> Self {
        let synthesized: Vec<&str> = CALENDAR_COLUMNS
            .iter()
            .copied()
            .chain(lags.iter().map(|(name, _)| name.as_str()))
            .collect();
        let columns: Vec<String> = table
            .column_names()
            .filter(|c| *c != table.target)
            .map(str::to_string)
            .collect();

        let mut defaults = BTreeMap::new();
        for name in &columns {
            if name.starts_with(STATION_PREFIX) {
                defaults.insert(name.clone(), 0.0);
                continue;
            }
            if synthesized.contains(&name.as_str()) {
                continue;
            }
            if let Some(col) = table.column(name) {
                let present: Vec<f64> = rows.iter().filter_map(|&r| col.values[r]).collect();
                let mean = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                defaults.insert(name.clone(), mean);
            }
        }

        Self {
            target: table.target.clone(),
            columns,
            stations: table.stations.clone(),
            lags: lags.to_vec(),
            defaults,
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Longest lag offset in hours.
    pub fn max_lag_hours(&self) -> i64 {
        self.lags.iter().map(|(_, h)| *h).max().unwrap_or(0)
    }

    /// Check that a table can feed this schema: same target, and every
    /// non one-hot column present.
    pub fn validate_table(&self, table: &FeatureTable) -> Result<()> {
        if self.target != table.target {
            return Err(PipelineError::FeatureMismatch(format!(
                "schema target {} but table target {}",
                self.target, table.target
            )));
        }
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !c.starts_with(STATION_PREFIX) && table.column(c).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::FeatureMismatch(format!(
                "table lacks schema columns {:?}",
                missing
            )));
        }
        Ok(())
    }

    /// Check that `station` can be encoded. A schema trained without station
    /// columns accepts any station.
    pub fn check_station(&self, station: &str) -> Result<()> {
        if !self.stations.is_empty() && !self.stations.iter().any(|s| s == station) {
            return Err(PipelineError::FeatureMismatch(format!(
                "station {} has no one-hot column in the trained schema",
                station
            )));
        }
        Ok(())
    }

    /// One-hot values for `station`, keyed by column name.
    pub fn one_hot(&self, station: &str) -> Vec<(String, f64)> {
        self.stations
            .iter()
            .map(|s| (one_hot_column(s), if s == station { 1.0 } else { 0.0 }))
            .collect()
    }

    /// Order a synthesized row by the schema. Columns absent from `values`
    /// take their recorded default; a column with neither is an error.
    pub fn align(&self, values: &HashMap<String, f64>) -> Result<Vec<f64>> {
        let mut row = Vec::with_capacity(self.columns.len());
        for name in &self.columns {
            match values.get(name).or_else(|| self.defaults.get(name)) {
                Some(v) => row.push(*v),
                None => {
                    return Err(PipelineError::FeatureMismatch(format!(
                        "no value or default for column {}",
                        name
                    )))
                }
            }
        }
        Ok(row)
    }

    /// Model input for a stored table row; `None` if any value is missing.
    pub fn table_row(&self, table: &FeatureTable, row: usize) -> Option<Vec<f64>> {
        self.columns
            .iter()
            .map(|name| match table.column(name) {
                Some(col) => col.values[row],
                None => self.defaults.get(name).copied(),
            })
            .collect()
    }
}
