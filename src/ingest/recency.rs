// src/ingest/recency.rs
use chrono::NaiveDate;

use crate::ingest::dates;

/// Trailing window of `days_limit` calendar days, plus exactly one day of
/// future tolerance for publishers whose clocks run ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    pub days_limit: i64,
    pub today: NaiveDate,
}

impl RecencyWindow {
    pub fn new(days_limit: i64, today: NaiveDate) -> Self {
        Self { days_limit, today }
    }

    pub fn admits_date(&self, published: NaiveDate) -> bool {
        let past_days = (self.today - published).num_days();
        if (0..=self.days_limit).contains(&past_days) {
            return true;
        }
        (published - self.today).num_days() == 1
    }

    /// Unparseable strings are never recent.
    pub fn admits(&self, raw: &str) -> bool {
        dates::parse_date(raw).is_some_and(|d| self.admits_date(d))
    }
}
