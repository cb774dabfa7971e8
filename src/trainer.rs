//! Forward-in-time holdout training.

use crate::config::{ForestConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::model::{RandomForest, Regressor};
use crate::pipeline::FeatureTable;
use crate::schema::FeatureSchema;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub target: String,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Year held out as the test set; `None` for single-year data.
    pub test_year: Option<i32>,
    pub train_r2: Option<f64>,
    /// Absent when there is no test partition.
    pub test_r2: Option<f64>,
    pub rmse: Option<f64>,
}

pub struct TrainedModel {
    pub model: RandomForest,
    pub schema: FeatureSchema,
    pub metrics: TrainingMetrics,
}

/// Rows of the last year present versus everything earlier.
#[derive(Debug, Clone, PartialEq)]
pub struct YearSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub test_year: Option<i32>,
}

/// Hold out the maximum year. With a single year there is nothing earlier
/// to train on, so every row trains and the test set is empty.
pub fn split_by_year(table: &FeatureTable) -> YearSplit {
    let Some(last) = table.timestamps.iter().map(|t| t.year()).max() else {
        return YearSplit { train: vec![], test: vec![], test_year: None };
    };
    let (train, test): (Vec<usize>, Vec<usize>) =
        (0..table.len()).partition(|&r| table.timestamps[r].year() < last);
    if train.is_empty() {
        return YearSplit { train: test, test: vec![], test_year: None };
    }
    YearSplit { train, test, test_year: Some(last) }
}

pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    if ss_tot <= 1e-12 {
        return None;
    }
    Some(1.0 - ss_res / ss_tot)
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return None;
    }
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    Some((sum / actual.len() as f64).sqrt())
}

/// Model inputs and targets for `rows`, skipping rows with any missing value.
fn matrix(schema: &FeatureSchema, table: &FeatureTable, rows: &[usize]) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let target = table.target_column()?;
    let mut x = Vec::with_capacity(rows.len());
    let mut y = Vec::with_capacity(rows.len());
    for &r in rows {
        if let (Some(features), Some(t)) = (schema.table_row(table, r), target.values[r]) {
            x.push(features);
            y.push(t);
        }
    }
    Ok((x, y))
}

pub fn train(table: &FeatureTable, pipeline: &PipelineConfig, forest: &ForestConfig) -> Result<TrainedModel> {
    let split = split_by_year(table);
    if split.train.is_empty() {
        return Err(PipelineError::InsufficientData("training set is empty".into()));
    }

    let schema = FeatureSchema::from_table(table, &split.train, &pipeline.lags);
    let (x_train, y_train) = matrix(&schema, table, &split.train)?;
    let (x_test, y_test) = matrix(&schema, table, &split.test)?;
    if x_train.is_empty() {
        return Err(PipelineError::InsufficientData(
            "no training row has a complete feature set".into(),
        ));
    }
    tracing::info!(
        target_column = %schema.target,
        features = schema.width(),
        train_rows = x_train.len(),
        test_rows = x_test.len(),
        skipped_incomplete = split.train.len() + split.test.len() - x_train.len() - x_test.len(),
        "training regressor"
    );

    let mut model = RandomForest::new(forest);
    model.fit(&x_train, &y_train)?;

    let train_pred = model.predict(&x_train)?;
    let (test_r2, test_rmse) = if x_test.is_empty() {
        tracing::warn!(year = ?split.test_year, "no test samples; holdout metrics unavailable");
        (None, None)
    } else {
        let test_pred = model.predict(&x_test)?;
        (r_squared(&y_test, &test_pred), rmse(&y_test, &test_pred))
    };

    let metrics = TrainingMetrics {
        target: schema.target.clone(),
        train_rows: x_train.len(),
        test_rows: x_test.len(),
        test_year: split.test_year,
        train_r2: r_squared(&y_train, &train_pred),
        test_r2,
        rmse: test_rmse,
    };
    tracing::info!(
        train_r2 = ?metrics.train_r2,
        test_r2 = ?metrics.test_r2,
        rmse = ?metrics.rmse,
        "model training complete"
    );
    Ok(TrainedModel { model, schema, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        assert_eq!(rmse(&[1.0, 3.0], &[1.0, 1.0]), Some(2.0f64.sqrt()));
        assert_eq!(r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), Some(1.0));
        assert_eq!(rmse(&[], &[]), None);
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 2.0]), None);
    }
}
