// src/config/mod.rs
//! Run configuration. Every component receives the piece it needs at
//! construction; nothing reads globals after startup.

pub mod sources;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::types::FeedKind;

pub const ENV_CONFIG_PATH: &str = "NEWS_DIGEST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_digest.toml";

pub use sources::{load_feed_sources, load_hardened_urls, load_keywords, ConfigError};

fn default_days_limit() -> i64 {
    1
}
fn default_max_snippet_len() -> usize {
    400
}
fn default_max_entries() -> usize {
    300
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_browser_slots() -> usize {
    1
}
fn default_concurrency() -> usize {
    1
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5_2) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}
fn default_accept() -> String {
    "application/rss+xml, application/xml;q=0.9, */*;q=0.8".to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}
fn default_referer() -> String {
    "https://www.google.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Concurrent headless browser processes.
    #[serde(default = "default_browser_slots")]
    pub browser_slots: usize,
    /// Chromium binary; autodetected when absent.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            referer: default_referer(),
            browser_slots: default_browser_slots(),
            chrome_executable: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Paths of the tabular inputs and output directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub rss_feeds: Option<PathBuf>,
    #[serde(default)]
    pub google_feeds: Option<PathBuf>,
    #[serde(default)]
    pub keywords: Option<PathBuf>,
    #[serde(default)]
    pub hardened_feeds: Option<PathBuf>,
    #[serde(default)]
    pub rss_articles_dir: Option<PathBuf>,
    #[serde(default)]
    pub google_articles_dir: Option<PathBuf>,
    #[serde(default)]
    pub rss_errors_dir: Option<PathBuf>,
    #[serde(default)]
    pub google_errors_dir: Option<PathBuf>,
    #[serde(default)]
    pub weekly_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn feeds(&self, kind: FeedKind) -> PathBuf {
        match kind {
            FeedKind::Rss => self
                .rss_feeds
                .clone()
                .unwrap_or_else(|| PathBuf::from("config/news_rss_availability.csv")),
            FeedKind::GoogleAlerts => self
                .google_feeds
                .clone()
                .unwrap_or_else(|| PathBuf::from("config/news_google_rss_list.csv")),
        }
    }

    pub fn keywords(&self) -> PathBuf {
        self.keywords
            .clone()
            .unwrap_or_else(|| PathBuf::from("config/news_rss_keywords.csv"))
    }

    pub fn hardened_feeds(&self) -> PathBuf {
        self.hardened_feeds
            .clone()
            .unwrap_or_else(|| PathBuf::from("config/news_playwright_rss_list.csv"))
    }

    pub fn articles_dir(&self, kind: FeedKind) -> PathBuf {
        match kind {
            FeedKind::Rss => self
                .rss_articles_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/digests/rss_digests")),
            FeedKind::GoogleAlerts => self
                .google_articles_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/digests/google_digests")),
        }
    }

    pub fn errors_dir(&self, kind: FeedKind) -> PathBuf {
        match kind {
            FeedKind::Rss => self
                .rss_errors_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/error_logs/rss_errors")),
            FeedKind::GoogleAlerts => self
                .google_errors_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("data/error_logs/google_errors")),
        }
    }

    pub fn weekly_dir(&self) -> PathBuf {
        self.weekly_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/digests/weekly"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Trailing recency window in calendar days.
    #[serde(default = "default_days_limit")]
    pub days_limit: i64,
    #[serde(default = "default_max_snippet_len")]
    pub max_snippet_len: usize,
    /// Entries per feed beyond this are ignored.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Pause between feeds of the same host. Defaults per feed kind.
    #[serde(default)]
    pub polite_delay_ms: Option<u64>,
    /// Feeds processed at once; 1 keeps the run strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Where to write a Prometheus text snapshot after a run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            days_limit: default_days_limit(),
            max_snippet_len: default_max_snippet_len(),
            max_entries: default_max_entries(),
            polite_delay_ms: None,
            concurrency: default_concurrency(),
            fetch: FetchConfig::default(),
            paths: PathsConfig::default(),
            metrics_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn polite_delay(&self, kind: FeedKind) -> Duration {
        let ms = self.polite_delay_ms.unwrap_or(match kind {
            FeedKind::Rss => 500,
            FeedKind::GoogleAlerts => 300,
        });
        Duration::from_millis(ms)
    }

    /// Replace nonsensical values with defaults.
    fn sanitize(mut self) -> Self {
        if self.days_limit < 0 {
            self.days_limit = default_days_limit();
        }
        if self.max_snippet_len == 0 {
            self.max_snippet_len = default_max_snippet_len();
        }
        if self.max_entries == 0 {
            self.max_entries = default_max_entries();
        }
        if self.concurrency == 0 {
            self.concurrency = default_concurrency();
        }
        if self.fetch.timeout_secs == 0 {
            self.fetch.timeout_secs = default_timeout_secs();
        }
        if self.fetch.browser_slots == 0 {
            self.fetch.browser_slots = default_browser_slots();
        }
        self
    }

    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: PipelineConfig = if ext == "json" {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?
        };
        Ok(cfg.sanitize())
    }

    /// Load using env var + fallbacks:
    /// 1) $NEWS_DIGEST_CONFIG
    /// 2) config/news_digest.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }
}
