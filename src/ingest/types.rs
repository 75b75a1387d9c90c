// src/ingest/types.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Which family of feeds a run processes. Drives the output schema,
/// file naming, fetch escalation and the final sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Rss,
    GoogleAlerts,
}

impl FeedKind {
    /// Filename stem of the daily record file.
    pub fn article_stem(self) -> &'static str {
        match self {
            FeedKind::Rss => "rss_articles",
            FeedKind::GoogleAlerts => "google_alerts_articles",
        }
    }

    pub fn error_stem(self) -> &'static str {
        match self {
            FeedKind::Rss => "rss_fetch_and_parse_errors",
            FeedKind::GoogleAlerts => "google_fetch_and_parse_errors",
        }
    }

    /// Column list of the daily record file, in output order.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            FeedKind::Rss => &RSS_FIELDS,
            FeedKind::GoogleAlerts => &GOOGLE_FIELDS,
        }
    }

    /// Google Alerts feeds are plain endpoints; only RSS sources escalate.
    pub fn escalates(self) -> bool {
        matches!(self, FeedKind::Rss)
    }

    /// Prefix used for weekly rollup files (`<prefix>_weekly_<end>.csv`).
    pub fn weekly_prefix(self) -> &'static str {
        match self {
            FeedKind::Rss => "rss",
            FeedKind::GoogleAlerts => "google",
        }
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(FeedKind::Rss),
            "google" | "google_alerts" | "google-alerts" => Ok(FeedKind::GoogleAlerts),
            other => Err(format!("unknown feed kind: {other}")),
        }
    }
}

pub const RSS_FIELDS: [&str; 6] = [
    "trigger_keywords",
    "title",
    "snippet",
    "date_published",
    "source_domain",
    "url",
];

pub const GOOGLE_FIELDS: [&str; 7] = [
    "keywords",
    "title",
    "snippet",
    "date_published",
    "source_domain",
    "url",
    "in_roundup",
];

pub const ERROR_FIELDS: [&str; 4] = ["feed_url", "label", "error_type", "error_message"];

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    /// Alert keywords (Google Alerts) or free-form label.
    pub label: String,
    /// Configured origin domain; empty when it must be derived from links.
    pub domain: String,
}

/// A parsed feed entry before normalization. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub alternate_links: Vec<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub published_parsed: Option<NaiveDateTime>,
    pub updated_parsed: Option<NaiveDateTime>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub content: Vec<String>,
}

/// Normalized, filtered output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub trigger_keywords: String,
    pub title: String,
    pub snippet: String,
    pub date_published: NaiveDate,
    pub source_domain: String,
    pub url: String,
    /// Reserved for manual curation downstream; written empty.
    pub in_roundup: String,
}

impl Article {
    /// Field values in the column order of `kind.fields()`.
    pub fn to_row(&self, kind: FeedKind) -> Vec<String> {
        let date = self.date_published.format("%Y-%m-%d").to_string();
        let mut row = vec![
            self.trigger_keywords.clone(),
            self.title.clone(),
            self.snippet.clone(),
            date,
            self.source_domain.clone(),
            self.url.clone(),
        ];
        if kind == FeedKind::GoogleAlerts {
            row.push(self.in_roundup.clone());
        }
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Fetch,
    Parse,
    Exception,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Fetch => "fetch",
            ErrorType::Parse => "parse",
            ErrorType::Exception => "exception",
        }
    }
}

/// One failed feed in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub feed_url: String,
    pub label: String,
    pub error_type: ErrorType,
    pub error_message: String,
}

/// Why a single entry did not become an article. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingTitle,
    MissingLink,
    MissingDate,
    NotRecent,
    NoTrigger,
    Duplicate,
}
