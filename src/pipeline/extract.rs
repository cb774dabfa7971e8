//! Raw records -> flat numeric frame: timestamp parsing, dedup, pollutant
//! unnesting and name normalization, numeric coercion, pruning.

use super::{Column, Frame};
use crate::error::{PipelineError, Result};
use crate::types::{RawRecord, RawTable};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const TIMESTAMP_FIELDS: [&str; 2] = ["Timestamp", "timestamp"];

/// Fields that identify a record rather than measure anything.
const IDENTIFIER_FIELDS: [&str; 6] = ["station", "city", "_id", "id", "timestamp", "Timestamp"];

/// Spellings that normalize to something other than the canonical label.
const ALIASES: [(&str, &str); 7] = [
    ("OZONE", "O3"),
    ("PM2P5", "PM25"),
    ("PM25UGM3", "PM25"),
    ("CARBONMONOXIDE", "CO"),
    ("NITROGENDIOXIDE", "NO2"),
    ("SULFURDIOXIDE", "SO2"),
    ("SULPHURDIOXIDE", "SO2"),
];

/// Collapse equivalent pollutant labels to one canonical name.
///
/// `PM2.5`, `pm2_5`, `PM 2.5` and `pm25` all become `PM25`.
pub fn canonical_name(label: &str) -> String {
    let norm: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    ALIASES
        .iter()
        .find(|(from, _)| *from == norm)
        .map(|(_, to)| to.to_string())
        .unwrap_or(norm)
}

/// Parse a loosely typed timestamp into a UTC instant. `None` means the
/// row gets dropped.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(m) => m.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Numbers and numeric strings become values; everything else is missing.
pub fn coerce_numeric(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    x.is_finite().then_some(x)
}

fn label(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flatten_into<'a>(prefix: &str, v: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match v {
        Value::Object(m) => {
            for (k, inner) in m {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_into(&key, inner, out);
            }
        }
        _ => out.push((prefix.to_string(), v)),
    }
}

/// Measurement fields of one record, with the `pollutants` nesting removed.
fn measurement_fields(rec: &RawRecord) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    for (k, v) in rec {
        if IDENTIFIER_FIELDS.contains(&k.as_str()) {
            continue;
        }
        if k == "pollutants" {
            flatten_into("", v, &mut out);
        } else if let Some(stripped) = k.strip_prefix("pollutants.") {
            flatten_into(stripped, v, &mut out);
        } else {
            flatten_into(k, v, &mut out);
        }
    }
    out
}

fn timestamp_field(rec: &RawRecord) -> Option<&Value> {
    TIMESTAMP_FIELDS.iter().find_map(|f| rec.get(*f))
}

/// Steps 1-4 of the pipeline. Rows are kept in arrival order.
pub(crate) fn extract_frame(raw: &RawTable) -> Result<Frame> {
    if raw.is_empty() {
        return Err(PipelineError::Data("no readings to process".into()));
    }
    if !raw.records.iter().any(|r| timestamp_field(r).is_some()) {
        return Err(PipelineError::Schema("no timestamp field in source data".into()));
    }

    let mut frame = Frame::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<(Option<String>, DateTime<Utc>)> = HashSet::new();
    let (mut bad_ts, mut dupes) = (0usize, 0usize);

    for rec in &raw.records {
        let Some(ts) = timestamp_field(rec).and_then(parse_timestamp) else {
            bad_ts += 1;
            continue;
        };
        let station = label(rec.get("station"));
        if !seen.insert((station.clone(), ts)) {
            dupes += 1;
            continue;
        }

        let row = frame.timestamps.len();
        frame.timestamps.push(ts);
        frame.stations.push(station);
        frame.cities.push(label(rec.get("city")));
        for col in frame.columns.iter_mut() {
            col.values.push(None);
        }

        for (name, value) in measurement_fields(rec) {
            let name = canonical_name(&name);
            if name.is_empty() {
                continue;
            }
            let ci = *index.entry(name.clone()).or_insert_with(|| {
                frame.columns.push(Column::new(name, vec![None; row + 1]));
                frame.columns.len() - 1
            });
            let slot = &mut frame.columns[ci].values[row];
            if slot.is_none() {
                *slot = coerce_numeric(value);
            }
        }
    }

    let before_cols = frame.columns.len();
    frame.columns.retain(|c| c.values.iter().any(Option::is_some));
    // Unlabelled rows only survive when no row carries a station.
    let labelled = frame.stations.iter().any(Option::is_some);
    let unlabelled_rows = if labelled {
        frame.stations.iter().filter(|s| s.is_none()).count()
    } else {
        0
    };
    let keep: Vec<usize> = (0..frame.len())
        .filter(|&r| !labelled || frame.stations[r].is_some())
        .filter(|&r| {
            frame.stations[r].is_some()
                || frame.cities[r].is_some()
                || frame.columns.iter().any(|c| c.values[r].is_some())
        })
        .collect();
    let empty_rows = frame.len() - keep.len() - unlabelled_rows;
    if keep.len() < frame.len() {
        frame = frame.select(&keep);
    }
    if unlabelled_rows > 0 {
        tracing::warn!(unlabelled_rows, "dropped readings without a station label");
    }

    tracing::debug!(
        rows = frame.len(),
        columns = frame.columns.len(),
        bad_timestamps = bad_ts,
        duplicates = dupes,
        empty_columns = before_cols - frame.columns.len(),
        empty_rows,
        "extracted raw frame"
    );
    Ok(frame)
}
