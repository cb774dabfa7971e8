//! Recursive multi-step forecasting.
//!
//! Each future hour gets a synthesized feature row: calendar fields and
//! seasonal weights from the timestamp, lags read from a rolling buffer of
//! target values. Every prediction is pushed back into the buffer, so once
//! the lag window slides past the end of history, forecasts are built on
//! earlier forecasts.

use crate::error::{PipelineError, Result};
use crate::model::Regressor;
use crate::pipeline::{calendar::CalendarFeatures, FeatureTable};
use crate::schema::FeatureSchema;
use crate::types::ForecastPoint;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Time-ordered target values for one station: seeded from history, then
/// extended with predictions. Keeps `window` worth of entries behind the
/// newest one, plus the entry just before that.
#[derive(Debug, Clone)]
pub struct LagBuffer {
    window: Duration,
    entries: VecDeque<(DateTime<Utc>, f64)>,
}

impl LagBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    pub fn seed(history: impl IntoIterator<Item = (DateTime<Utc>, f64)>, window: Duration) -> Self {
        let mut buf = Self::new(window);
        for (ts, v) in history {
            buf.insert(ts, v);
        }
        buf.evict();
        buf
    }

    /// Add a value, replacing any entry at the same instant.
    pub fn push(&mut self, ts: DateTime<Utc>, value: f64) {
        self.insert(ts, value);
        self.evict();
    }

    fn insert(&mut self, ts: DateTime<Utc>, value: f64) {
        let idx = self.entries.partition_point(|(t, _)| *t < ts);
        if self.entries.get(idx).is_some_and(|e| e.0 == ts) {
            self.entries[idx].1 = value;
        } else {
            self.entries.insert(idx, (ts, value));
        }
    }

    fn evict(&mut self) {
        let Some(&(newest, _)) = self.entries.back() else {
            return;
        };
        let boundary = newest - self.window;
        while self.entries.len() >= 2 && self.entries[1].0 <= boundary {
            self.entries.pop_front();
        }
    }

    /// Value at `ts`, else the latest one before it. `None` if every held
    /// entry is later than `ts`.
    pub fn value_at(&self, ts: DateTime<Utc>) -> Option<f64> {
        let idx = self.entries.partition_point(|(t, _)| *t <= ts);
        idx.checked_sub(1).and_then(|i| self.entries.get(i)).map(|e| e.1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Projects a trained model forward for one station at a time. Holds only
/// borrowed, read-only state; `forecast` is deterministic.
pub struct ForecastEngine<'a> {
    table: &'a FeatureTable,
    model: &'a dyn Regressor,
    schema: &'a FeatureSchema,
    log_rows: bool,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(table: &'a FeatureTable, model: &'a dyn Regressor, schema: &'a FeatureSchema) -> Self {
        Self {
            table,
            model,
            schema,
            log_rows: false,
        }
    }

    /// Log every synthesized row at info level.
    pub fn with_row_logging(mut self, enabled: bool) -> Self {
        self.log_rows = enabled;
        self
    }

    /// Forecast `hours` points for `station`. Point `i` (1-based) is stamped
    /// `start_time + i hours`; `hours == 0` yields an empty sequence.
    ///
    /// Only history at or before `start_time` feeds the lags, so a start
    /// inside the recorded range replays the station from that point.
    pub fn forecast(&self, station: &str, start_time: DateTime<Utc>, hours: usize) -> Result<Vec<ForecastPoint>> {
        let rows = self.table.station_rows(station);
        if rows.is_empty() {
            return Err(PipelineError::UnknownStation(station.to_string()));
        }
        self.schema.check_station(station)?;
        if self.schema.target != self.table.target {
            return Err(PipelineError::FeatureMismatch(format!(
                "model predicts {} but feature table targets {}",
                self.schema.target, self.table.target
            )));
        }

        let first_seen = self.table.timestamps[rows[0]];
        if start_time < first_seen {
            return Err(PipelineError::InvalidRequest(format!(
                "start_time {} precedes the first reading for station {} at {}",
                start_time.to_rfc3339(),
                station,
                first_seen.to_rfc3339()
            )));
        }

        let target = self.table.target_column()?;
        let history = rows
            .iter()
            .filter(|&&r| self.table.timestamps[r] <= start_time)
            .filter_map(|&r| target.values[r].map(|v| (self.table.timestamps[r], v)));
        let mut buffer = LagBuffer::seed(history, Duration::hours(self.schema.max_lag_hours()));
        if buffer.is_empty() {
            return Err(PipelineError::Data(format!("station {} has no target history", station)));
        }

        let one_hot = self.schema.one_hot(station);
        let mut out = Vec::with_capacity(hours);
        for step in 1..=hours {
            let ts = start_time + Duration::hours(step as i64);

            let mut features: BTreeMap<String, f64> = CalendarFeatures::at(ts)
                .entries()
                .iter()
                .map(|(name, v)| (name.to_string(), *v))
                .collect();
            for (name, offset) in &self.schema.lags {
                let at = ts - Duration::hours(*offset);
                let lagged = buffer.value_at(at).ok_or_else(|| {
                    PipelineError::Data(format!(
                        "station {} has no history at or before {} for {}",
                        station,
                        at.to_rfc3339(),
                        name
                    ))
                })?;
                features.insert(name.clone(), lagged);
            }

            let mut values: HashMap<String, f64> =
                features.iter().map(|(k, v)| (k.clone(), *v)).collect();
            values.extend(one_hot.iter().cloned());
            let row = self.schema.align(&values)?;
            let predicted = self.model.predict_row(&row)?;

            if self.log_rows {
                tracing::info!(station, step, %ts, predicted, row = ?row, "forecast row");
            }

            buffer.push(ts, predicted);
            out.push(ForecastPoint {
                timestamp: ts,
                station: station.to_string(),
                target: self.schema.target.clone(),
                predicted,
                features,
            });
        }
        Ok(out)
    }
}
