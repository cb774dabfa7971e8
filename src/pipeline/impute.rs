//! Imputation: same-calendar-hour lookahead into later years, then
//! time-weighted linear interpolation.

use super::Frame;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SeasonalKey {
    month: u32,
    day: u32,
    hour: u32,
}

impl SeasonalKey {
    fn of(ts: &DateTime<Utc>) -> Self {
        Self {
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
        }
    }
}

/// Index of (station, month, day, hour) -> year -> row, built over the
/// frame before any value is filled.
struct SeasonalLookup<'a> {
    index: HashMap<(Option<&'a str>, SeasonalKey), BTreeMap<i32, usize>>,
}

impl<'a> SeasonalLookup<'a> {
    fn build(timestamps: &[DateTime<Utc>], stations: &'a [Option<String>]) -> Self {
        let mut index: HashMap<_, BTreeMap<i32, usize>> = HashMap::new();
        for (row, (ts, station)) in timestamps.iter().zip(stations).enumerate() {
            index
                .entry((station.as_deref(), SeasonalKey::of(ts)))
                .or_default()
                .entry(ts.year())
                .or_insert(row);
        }
        Self { index }
    }

    /// Rows at the same calendar hour in years `year+1 ..= year+max_years`,
    /// nearest year first.
    fn later_rows(&self, station: Option<&'a str>, ts: &DateTime<Utc>, max_years: i32) -> Vec<usize> {
        let year = ts.year();
        match self.index.get(&(station, SeasonalKey::of(ts))) {
            Some(years) => years
                .range(year.saturating_add(1)..=year.saturating_add(max_years))
                .map(|(_, row)| *row)
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Fill missing values from the same month/day/hour of a later year.
/// Returns the number of values filled.
pub(crate) fn fill_future(frame: &mut Frame, max_years: i32) -> usize {
    if max_years < 1 {
        return 0;
    }
    let Frame {
        timestamps,
        stations,
        columns,
        ..
    } = frame;
    let (timestamps, stations) = (&*timestamps, &*stations);
    let lookup = SeasonalLookup::build(timestamps, stations);

    let mut filled = 0;
    for col in columns.iter_mut() {
        let original = col.values.clone();
        for (row, slot) in col.values.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let found = lookup
                .later_rows(stations[row].as_deref(), &timestamps[row], max_years)
                .into_iter()
                .find_map(|r| original[r]);
            if found.is_some() {
                *slot = found;
                filled += 1;
            }
        }
    }
    filled
}

/// Linear interpolation over `times`, weighted by elapsed seconds, with the
/// nearest known value carried out past either end. Series with no known
/// value are left alone.
pub fn interpolate_series(times: &[i64], values: &mut [Option<f64>]) -> usize {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    if known.is_empty() || known.len() == values.len() {
        return 0;
    }

    let mut filled = 0;
    for i in 0..values.len() {
        if values[i].is_some() {
            continue;
        }
        let pos = known.partition_point(|(k, _)| *k < i);
        let prev = pos.checked_sub(1).map(|p| known[p]);
        let next = known.get(pos).copied();
        values[i] = match (prev, next) {
            (Some((p, vp)), Some((n, vn))) => {
                let span = (times[n] - times[p]) as f64;
                if span <= 0.0 {
                    Some(vp)
                } else {
                    let ratio = (times[i] - times[p]) as f64 / span;
                    Some(vp + ratio * (vn - vp))
                }
            }
            (Some((_, vp)), None) => Some(vp),
            (None, Some((_, vn))) => Some(vn),
            (None, None) => None,
        };
        filled += 1;
    }
    filled
}

/// Rows grouped by station, each group in ascending time order.
pub(crate) fn station_groups(frame: &Frame) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
    for (row, station) in frame.stations.iter().enumerate() {
        groups.entry(station.as_deref()).or_default().push(row);
    }
    groups
        .into_values()
        .map(|mut rows| {
            rows.sort_by_key(|&r| frame.timestamps[r]);
            rows
        })
        .collect()
}

fn interpolate_rows(frame: &mut Frame, rows: &[usize]) -> usize {
    let times: Vec<i64> = rows.iter().map(|&r| frame.timestamps[r].timestamp()).collect();
    let mut filled = 0;
    for col in frame.columns.iter_mut() {
        let mut series: Vec<Option<f64>> = rows.iter().map(|&r| col.values[r]).collect();
        let n = interpolate_series(&times, &mut series);
        if n > 0 {
            for (&r, v) in rows.iter().zip(series) {
                col.values[r] = v;
            }
            filled += n;
        }
    }
    filled
}

/// Interpolate within each station's series, then across all stations for
/// anything a station never reported.
pub(crate) fn interpolate(frame: &mut Frame) -> usize {
    let mut filled = 0;
    for rows in station_groups(frame) {
        filled += interpolate_rows(frame, &rows);
    }

    let mut all: Vec<usize> = (0..frame.len()).collect();
    all.sort_by_key(|&r| frame.timestamps[r]);
    filled + interpolate_rows(frame, &all)
}
