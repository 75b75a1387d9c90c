// src/ingest/dates.rs
//! Lenient date parsing for feed timestamps.
//!
//! Moments are reduced to the calendar date written in the string; offsets
//! are never applied, so "Tue, 04 Jun 2024 23:30:00 -0700" is 2024-06-04.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use regex::Regex;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%d %B %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%d %b %Y %H:%M",
    "%b %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d %b %Y",
    "%d %B %Y",
    "%a, %d %b %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

/// Trailing zone designators chrono's naive formats cannot take ("GMT", "EST", "+0000", "Z").
fn strip_zone(s: &str) -> &str {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(?:z|[a-z]{1,5}|[+-]\d{2}:?\d{2})$").expect("zone regex")
    });
    match re.find(s) {
        // Keep plain dates like "04 Jun 2024" intact: only strip after a time.
        Some(m) if s[..m.start()].contains(':') => s[..m.start()].trim_end(),
        _ => s,
    }
}

/// Leading day name ("Mon, "). chrono rejects a weekday that disagrees
/// with the date, which some feeds get wrong.
fn strip_weekday(s: &str) -> Option<&str> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)^[a-z]{3,9},\s*").expect("weekday regex"));
    re.find(s).map(|m| s[m.end()..].trim_start())
}

fn moment_from_formats(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_local());
    }
    let bare = strip_zone(s);
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(bare, fmt).ok())
}

fn date_from_formats(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn moment(s: &str) -> Option<NaiveDateTime> {
    moment_from_formats(s).or_else(|| strip_weekday(s).and_then(moment_from_formats))
}

fn date(s: &str) -> Option<NaiveDate> {
    date_from_formats(s).or_else(|| strip_weekday(s).and_then(date_from_formats))
}

/// Parse a feed timestamp into a wall-clock moment (offset dropped).
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    moment(s).or_else(|| date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parse a feed timestamp down to its calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    date(s).or_else(|| moment(s).map(|dt| dt.date()))
}

/// ISO-8601 rendering used when only a parsed moment is available.
pub fn to_iso(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn rfc2822_keeps_written_date() {
        assert_eq!(parse_date("Tue, 04 Jun 2024 23:30:00 -0700"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("Tue, 04 Jun 2024 10:00:00 GMT"), Some(d(2024, 6, 4)));
    }

    #[test]
    fn iso_variants() {
        assert_eq!(parse_date("2024-06-04T23:59:59Z"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("2024-06-04T10:00:00.123+02:00"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("2024-06-04 08:15:00"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("2024-06-04"), Some(d(2024, 6, 4)));
    }

    #[test]
    fn human_forms() {
        assert_eq!(parse_date("June 4, 2024"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("4 Jun 2024"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("04 Jun 2024 10:00:00 EST"), Some(d(2024, 6, 4)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_date("Updated: soon"), None);
        assert_eq!(parse_datetime("Updated: soon"), None);
        assert_eq!(parse_date("T minus 3"), None);
    }

    #[test]
    fn wrong_weekday_still_parses() {
        // 2024-06-04 was a Tuesday.
        assert_eq!(parse_date("Mon, 04 Jun 2024 10:00:00 GMT"), Some(d(2024, 6, 4)));
        assert_eq!(parse_date("Mon, 04 Jun 2024"), Some(d(2024, 6, 4)));
        let dt = parse_datetime("Fri, 04 Jun 2024 10:00:00 +0000").unwrap();
        assert_eq!(to_iso(&dt), "2024-06-04T10:00:00");
    }

    #[test]
    fn iso_rendering() {
        let dt = parse_datetime("2024-06-04T10:11:12Z").unwrap();
        assert_eq!(to_iso(&dt), "2024-06-04T10:11:12");
    }
}
