// src/rollup/batch.rs
//! Merge daily files into one, keeping each distinct record once.
//!
//! Identity for CSV rows is the tuple of required fields, each trimmed.
//! Identity for JSON objects is their canonical serialization (keys sorted
//! at every level). Stored values are never trimmed or reordered; the first
//! occurrence in input order is the one written.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use metrics::counter;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub unique: usize,
    pub total: usize,
    pub duplicates: usize,
}

impl BatchCounts {
    fn new(unique: usize, total: usize) -> Self {
        Self {
            unique,
            total,
            duplicates: total.saturating_sub(unique),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("{}: missing expected fields: {}", path.display(), missing.join(", "))]
    MissingFields { path: PathBuf, missing: Vec<String> },
    #[error("{}: top level is not a JSON array", path.display())]
    NotAnArray { path: PathBuf },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> BatchError + '_ {
    move |source| BatchError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BatchError + '_ {
    move |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn open_csv(path: &Path) -> Result<csv::Reader<fs::File>, BatchError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err(path))
}

/// Column index of each required field, or the list of missing ones.
fn field_positions(
    path: &Path,
    headers: &csv::StringRecord,
    fields: &[&str],
) -> Result<Vec<usize>, BatchError> {
    let names: Vec<&str> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| if i == 0 { h.trim_start_matches('\u{feff}') } else { h })
        .collect();

    let mut positions = Vec::with_capacity(fields.len());
    let mut missing = Vec::new();
    for f in fields {
        match names.iter().position(|n| n == f) {
            Some(i) => positions.push(i),
            None => missing.push(f.to_string()),
        }
    }
    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(BatchError::MissingFields {
            path: path.to_path_buf(),
            missing,
        })
    }
}

fn create_parent(out: &Path) -> Result<(), BatchError> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    Ok(())
}

/// Merge CSV files with the `fields` schema into `out`.
///
/// Every header is checked before anything is read or written, so schema
/// drift in any input leaves no output behind.
pub fn build_master_csv(
    inputs: &[PathBuf],
    out: &Path,
    fields: &[&str],
) -> Result<BatchCounts, BatchError> {
    let mut readers = Vec::with_capacity(inputs.len());
    for path in inputs {
        let mut rdr = open_csv(path)?;
        let headers = rdr.headers().map_err(csv_err(path))?.clone();
        let positions = field_positions(path, &headers, fields)?;
        readers.push((path, rdr, positions));
    }

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut unique_rows: Vec<Vec<String>> = Vec::new();
    let mut total = 0usize;

    for (path, mut rdr, positions) in readers {
        let before = total;
        for record in rdr.records() {
            let record = record.map_err(csv_err(path))?;
            total += 1;
            let row: Vec<String> = positions
                .iter()
                .map(|&i| record.get(i).unwrap_or_default().to_string())
                .collect();
            let identity: Vec<String> = row.iter().map(|v| v.trim().to_string()).collect();
            if seen.insert(identity) {
                unique_rows.push(row);
            }
        }
        debug!(target: "rollup", path = %path.display(), rows = total - before, "read csv");
    }

    create_parent(out)?;
    let mut w = csv::Writer::from_path(out).map_err(csv_err(out))?;
    w.write_record(fields).map_err(csv_err(out))?;
    for row in &unique_rows {
        w.write_record(row).map_err(csv_err(out))?;
    }
    w.flush().map_err(io_err(out))?;

    let counts = BatchCounts::new(unique_rows.len(), total);
    record_counts(out, inputs.len(), counts);
    Ok(counts)
}

/// Key-order-independent serialization used as the identity of a JSON value.
pub fn canonical_json(v: &Value) -> String {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let inner: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        other => other.to_string(),
    }
}

/// Merge JSON-array files into one pretty-printed array at `out`.
/// Non-object elements are skipped and not counted.
pub fn build_master_json(inputs: &[PathBuf], out: &Path) -> Result<BatchCounts, BatchError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<Value> = Vec::new();
    let mut total = 0usize;

    for path in inputs {
        let text = fs::read_to_string(path).map_err(io_err(path))?;
        let data: Value = serde_json::from_str(&text).map_err(|source| BatchError::Json {
            path: path.clone(),
            source,
        })?;
        let Value::Array(items) = data else {
            return Err(BatchError::NotAnArray { path: path.clone() });
        };
        for item in items {
            if !item.is_object() {
                continue;
            }
            total += 1;
            if seen.insert(canonical_json(&item)) {
                unique.push(item);
            }
        }
    }

    create_parent(out)?;
    let body = serde_json::to_string_pretty(&unique).map_err(|source| BatchError::Json {
        path: out.to_path_buf(),
        source,
    })?;
    fs::write(out, body).map_err(io_err(out))?;

    let counts = BatchCounts::new(unique.len(), total);
    record_counts(out, inputs.len(), counts);
    Ok(counts)
}

fn record_counts(out: &Path, files: usize, counts: BatchCounts) {
    counter!("rollup_rows_total").increment(counts.total as u64);
    counter!("rollup_duplicates_total").increment(counts.duplicates as u64);
    info!(
        target: "rollup",
        out = %out.display(),
        files,
        total = counts.total,
        unique = counts.unique,
        duplicates = counts.duplicates,
        "rollup written"
    );
}
