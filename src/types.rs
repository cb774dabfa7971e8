use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One denormalized source record: flat fields plus an optional nested
/// `pollutants` object. Field values are kept as loose JSON so that
/// timestamp parsing and numeric coercion can soft-fail per row.
pub type RawRecord = Map<String, Value>;

/// Ordered collection of raw records, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub records: Vec<RawRecord>,
}

impl RawTable {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<RawReading> for RawTable {
    fn from_iter<I: IntoIterator<Item = RawReading>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(RawReading::into_record).collect())
    }
}

/// Typed sensor observation, for producers that already hold parsed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    pub station: String,
    pub city: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub pollutants: HashMap<String, Option<f64>>,
}

impl RawReading {
    pub fn into_record(self) -> RawRecord {
        let mut pollutants = Map::new();
        for (name, value) in self.pollutants {
            let v = value.map(Value::from).unwrap_or(Value::Null);
            pollutants.insert(name, v);
        }

        let mut rec = Map::new();
        rec.insert("station".into(), Value::String(self.station));
        if let Some(city) = self.city {
            rec.insert("city".into(), Value::String(city));
        }
        rec.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        rec.insert("pollutants".into(), Value::Object(pollutants));
        rec
    }
}

/// One step of a forecast. Created by the forecast engine, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub station: String,
    pub target: String,
    pub predicted: f64,
    /// Echo of the synthesized calendar, weight and lag inputs.
    #[serde(flatten)]
    pub features: BTreeMap<String, f64>,
}
