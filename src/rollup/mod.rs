// src/rollup/mod.rs
pub mod batch;
pub mod window;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::ingest::types::FeedKind;

pub use batch::{build_master_csv, build_master_json, BatchCounts, BatchError};
pub use window::{
    find_latest_rollup_end, list_dated_files, most_recent_friday, rollup_filename, select,
    weekly_filename, DatedFile, Selection, WindowError, WindowPolicy, ROLLUP_PREFIX,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupFormat {
    Csv,
    Json,
}

impl RollupFormat {
    pub fn ext(self) -> &'static str {
        match self {
            RollupFormat::Csv => "csv",
            RollupFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub inputs: usize,
    /// `None` when no file fell inside the window.
    pub output: Option<PathBuf>,
    pub counts: BatchCounts,
}

impl RollupReport {
    fn empty(sel: &Selection) -> Self {
        Self {
            start: sel.start,
            end: sel.end,
            inputs: 0,
            output: None,
            counts: BatchCounts::default(),
        }
    }
}

/// Saturday..Friday weekly CSV for `kind`: `<prefix>_weekly_<end>.csv` in `weekly_dir`.
pub fn run_weekly(
    input_dir: &Path,
    weekly_dir: &Path,
    kind: FeedKind,
    week_ending: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<RollupReport> {
    let files = list_dated_files(input_dir, kind.article_stem(), "csv")
        .with_context(|| format!("listing {}", input_dir.display()))?;
    let sel = select(&files, &WindowPolicy::FixedWeek { week_ending }, today)?;
    if sel.is_empty() {
        info!(target: "rollup", dir = %input_dir.display(), week_ending = %sel.end, "no daily files in week window");
        return Ok(RollupReport::empty(&sel));
    }

    let out = weekly_dir.join(weekly_filename(kind.weekly_prefix(), sel.end));
    let counts = build_master_csv(&sel.paths(), &out, kind.fields())?;
    Ok(RollupReport {
        start: sel.start,
        end: sel.end,
        inputs: sel.files.len(),
        output: Some(out),
        counts,
    })
}

/// Range rollup ending today. With `start == None` the window picks up
/// where the last rollup in `output_dir` ended.
pub fn run_range(
    input_dir: &Path,
    output_dir: &Path,
    kind: FeedKind,
    format: RollupFormat,
    start: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<RollupReport> {
    let ext = format.ext();
    let files = list_dated_files(input_dir, kind.article_stem(), ext)
        .with_context(|| format!("listing {}", input_dir.display()))?;

    let policy = match start {
        Some(start) => WindowPolicy::Range { start },
        None => WindowPolicy::Incremental {
            last_end: find_latest_rollup_end(output_dir, ROLLUP_PREFIX, ext)
                .with_context(|| format!("scanning {}", output_dir.display()))?,
        },
    };
    let sel = select(&files, &policy, today)?;
    if sel.is_empty() {
        info!(target: "rollup", dir = %input_dir.display(), start = %sel.start, end = %sel.end, "nothing new to roll up");
        return Ok(RollupReport::empty(&sel));
    }

    let out = output_dir.join(rollup_filename(ROLLUP_PREFIX, sel.start, sel.end, ext));
    let counts = match format {
        RollupFormat::Csv => build_master_csv(&sel.paths(), &out, kind.fields())?,
        RollupFormat::Json => build_master_json(&sel.paths(), &out)?,
    };
    Ok(RollupReport {
        start: sel.start,
        end: sel.end,
        inputs: sel.files.len(),
        output: Some(out),
        counts,
    })
}
