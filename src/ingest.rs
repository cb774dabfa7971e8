//! Ingestion adapter: reads raw sensor records from a JSON export.

use crate::error::{PipelineError, Result};
use crate::types::{RawRecord, RawTable};
use serde_json::Value;
use std::{fs, path::PathBuf};

/// Source of raw readings, bounded by a maximum row count.
///
/// Implementations must report connectivity or decode failures as errors;
/// an empty table is a valid (if useless) answer.
pub trait ReadingSource {
    fn fetch(&self, limit: usize) -> Result<RawTable>;
}

/// Reads a JSON array of objects, or newline-delimited JSON objects.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReadingSource for JsonFileSource {
    fn fetch(&self, limit: usize) -> Result<RawTable> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Ingest(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let records = if text.trim_start().starts_with('[') {
            let doc: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
                PipelineError::Ingest(format!("failed to parse {}: {}", self.path.display(), e))
            })?;
            take_objects(doc, limit)
        } else {
            let mut docs = Vec::new();
            for (n, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let doc: Value = serde_json::from_str(line).map_err(|e| {
                    PipelineError::Ingest(format!("{}:{}: {}", self.path.display(), n + 1, e))
                })?;
                docs.push(doc);
            }
            take_objects(docs, limit)
        };

        tracing::info!(path = %self.path.display(), rows = records.len(), limit, "loaded raw readings");
        Ok(RawTable::new(records))
    }
}

fn take_objects(docs: Vec<Value>, limit: usize) -> Vec<RawRecord> {
    let mut skipped = 0usize;
    let records: Vec<RawRecord> = docs
        .into_iter()
        .filter_map(|doc| match doc {
            Value::Object(map) => Some(map),
            _ => {
                skipped += 1;
                None
            }
        })
        .take(limit)
        .collect();
    if skipped > 0 {
        tracing::debug!(skipped, "skipped non-object records");
    }
    records
}
