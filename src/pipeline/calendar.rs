//! Calendar fields and the fixed seasonal weight tables. Shared by the
//! feature pipeline and the forecast engine so both derive identical values.

use chrono::{DateTime, Datelike, Timelike, Utc};

pub const HOUR: &str = "hour";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const MONTH: &str = "month";
pub const MONTH_WEIGHT: &str = "month_weight";
pub const HOUR_WEIGHT: &str = "hour_weight";

/// Column names in the order they are appended to the feature table.
pub const CALENDAR_COLUMNS: [&str; 5] = [HOUR, DAY_OF_WEEK, MONTH, MONTH_WEIGHT, HOUR_WEIGHT];

// Winter-heavy: 1.0 in Dec/Jan tapering to 0.1 over the summer months.
const MONTH_WEIGHTS: [f64; 12] = [1.0, 0.8, 0.6, 0.4, 0.2, 0.1, 0.1, 0.1, 0.2, 0.6, 0.9, 1.0];

/// Weight for a calendar month (1-12). Out-of-range months weigh 0.
pub fn month_weight(month: u32) -> f64 {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_WEIGHTS.get(i as usize))
        .copied()
        .unwrap_or(0.0)
}

/// Peaks at 0.9 for hour 12, minus 0.05 per hour of distance.
pub fn hour_weight(hour: u32) -> f64 {
    0.9 - (12 - hour as i64).abs() as f64 * 0.05
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarFeatures {
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub month: u32,
    pub month_weight: f64,
    pub hour_weight: f64,
}

impl CalendarFeatures {
    pub fn at(ts: DateTime<Utc>) -> Self {
        let hour = ts.hour();
        let month = ts.month();
        Self {
            hour,
            day_of_week: ts.weekday().num_days_from_monday(),
            month,
            month_weight: month_weight(month),
            hour_weight: hour_weight(hour),
        }
    }

    /// Values keyed by column name, in `CALENDAR_COLUMNS` order.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            (HOUR, self.hour as f64),
            (DAY_OF_WEEK, self.day_of_week as f64),
            (MONTH, self.month as f64),
            (MONTH_WEIGHT, self.month_weight),
            (HOUR_WEIGHT, self.hour_weight),
        ]
    }
}
