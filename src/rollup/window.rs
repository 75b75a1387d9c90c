// src/rollup/window.rs
//! Which dated files belong to a rollup window.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

/// Prefix of range rollups: `deduped_candidate_articles_<start>_to_<end>.<ext>`.
pub const ROLLUP_PREFIX: &str = "deduped_candidate_articles";

/// Days in a fixed (Saturday..Friday) week window.
pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFile {
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl DatedFile {
    fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Trailing seven days ending on `week_ending` (default: most recent Friday).
    FixedWeek { week_ending: Option<NaiveDate> },
    /// `start` through today, inclusive.
    Range { start: NaiveDate },
    /// Day after the last rollup's end through today; the earliest daily
    /// file when no rollup exists yet.
    Incremental { last_end: Option<NaiveDate> },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("start date {start} is in the future (today is {today})")]
    FutureStart { start: NaiveDate, today: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub files: Vec<DatedFile>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

fn dated_name_re(stem: &str, ext: &str) -> Regex {
    // Anchored: the whole name must match, nothing before or after.
    Regex::new(&format!(
        r"(?i)^{}_(\d{{4}}-\d{{2}}-\d{{2}})\.{}$",
        regex::escape(stem),
        regex::escape(ext)
    ))
    .expect("escaped pattern is valid")
}

fn capture_date(re: &Regex, name: &str) -> Option<NaiveDate> {
    let caps = re.captures(name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// Date embedded in `<stem>_<YYYY-MM-DD>.<ext>`, or `None` for any other name.
pub fn parse_dated_name(name: &str, stem: &str, ext: &str) -> Option<NaiveDate> {
    capture_date(&dated_name_re(stem, ext), name)
}

/// Dated files in `dir`, sorted by (date, filename). A missing directory is empty.
pub fn list_dated_files(dir: &Path, stem: &str, ext: &str) -> io::Result<Vec<DatedFile>> {
    let re = dated_name_re(stem, ext);
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(date) = capture_date(&re, name) {
            out.push(DatedFile {
                date,
                path: entry.path(),
            });
        }
    }
    sort_dated(&mut out);
    Ok(out)
}

pub fn sort_dated(files: &mut [DatedFile]) {
    files.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name().cmp(b.name())));
}

/// Most recent Friday on or before `d`.
pub fn most_recent_friday(d: NaiveDate) -> NaiveDate {
    let offset = (d.weekday().num_days_from_monday() as i64 - 4).rem_euclid(7);
    d - Duration::days(offset)
}

/// Latest end date among `<prefix>_<start>_to_<end>.<ext>` files in `dir`.
pub fn find_latest_rollup_end(dir: &Path, prefix: &str, ext: &str) -> io::Result<Option<NaiveDate>> {
    let re = Regex::new(&format!(
        r"(?i)^{}_(\d{{4}}-\d{{2}}-\d{{2}})_to_(\d{{4}}-\d{{2}}-\d{{2}})\.{}$",
        regex::escape(prefix),
        regex::escape(ext)
    ))
    .expect("escaped pattern is valid");

    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut latest: Option<NaiveDate> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = re.captures(name) else { continue };
        if let Ok(end) = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d") {
            latest = latest.max(Some(end));
        }
    }
    Ok(latest)
}

/// Resolve `policy` to a date range and pick the files inside it.
/// `files` must already be sorted; the order is preserved. For `Range` and
/// `Incremental` a non-empty selection reports the first and last file dates.
pub fn select(
    files: &[DatedFile],
    policy: &WindowPolicy,
    today: NaiveDate,
) -> Result<Selection, WindowError> {
    let (start, end) = match policy {
        WindowPolicy::FixedWeek { week_ending } => {
            let end = week_ending.unwrap_or_else(|| most_recent_friday(today));
            (end - Duration::days(WEEK_DAYS - 1), end)
        }
        WindowPolicy::Range { start } => {
            if *start > today {
                return Err(WindowError::FutureStart {
                    start: *start,
                    today,
                });
            }
            (*start, today)
        }
        WindowPolicy::Incremental { last_end } => {
            let start = match last_end {
                Some(end) => *end + Duration::days(1),
                None => files.first().map(|f| f.date).unwrap_or(today),
            };
            (start, today)
        }
    };

    let files: Vec<DatedFile> = files
        .iter()
        .filter(|f| start <= f.date && f.date <= end)
        .cloned()
        .collect();

    // Open-ended windows are named after the files actually read, so the
    // next incremental run resumes right after the last one covered.
    let (start, end) = match (policy, files.first(), files.last()) {
        (WindowPolicy::FixedWeek { .. }, _, _) => (start, end),
        (_, Some(first), Some(last)) => (first.date, last.date),
        _ => (start, end),
    };
    Ok(Selection { start, end, files })
}

pub fn rollup_filename(prefix: &str, start: NaiveDate, end: NaiveDate, ext: &str) -> String {
    format!(
        "{prefix}_{}_to_{}.{ext}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

pub fn weekly_filename(prefix: &str, end: NaiveDate) -> String {
    format!("{prefix}_weekly_{}.csv", end.format("%Y-%m-%d"))
}
