// src/records.rs
//! Daily record files and error logs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::ingest::types::{Article, ErrorRecord, FeedKind, ERROR_FIELDS};

/// `<stem>_<YYYY-MM-DD>.csv`
pub fn daily_filename(stem: &str, date: NaiveDate) -> String {
    format!("{stem}_{}.csv", date.format("%Y-%m-%d"))
}

/// Write the run's articles with the schema of `kind`. Returns the path written.
pub fn write_articles(
    dir: &Path,
    kind: FeedKind,
    date: NaiveDate,
    articles: &[Article],
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(daily_filename(kind.article_stem(), date));

    let mut w = csv::Writer::from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    w.write_record(kind.fields())?;
    for a in articles {
        w.write_record(a.to_row(kind))?;
    }
    w.flush()?;

    info!(target: "ingest", path = %path.display(), rows = articles.len(), "wrote daily records");
    Ok(path)
}

/// Write the run's error log. Written even when empty, so every run leaves a trace.
pub fn write_errors(
    dir: &Path,
    kind: FeedKind,
    date: NaiveDate,
    errors: &[ErrorRecord],
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(daily_filename(kind.error_stem(), date));

    let mut w = csv::Writer::from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    w.write_record(ERROR_FIELDS)?;
    for e in errors {
        w.write_record([
            e.feed_url.as_str(),
            e.label.as_str(),
            e.error_type.as_str(),
            e.error_message.as_str(),
        ])?;
    }
    w.flush()?;

    info!(target: "ingest", path = %path.display(), rows = errors.len(), "wrote error log");
    Ok(path)
}
