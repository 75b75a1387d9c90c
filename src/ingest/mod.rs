// src/ingest/mod.rs
pub mod dates;
pub mod dedup;
pub mod fetch;
pub mod keywords;
pub mod normalize;
pub mod parser;
pub mod recency;
pub mod tier;
pub mod types;

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::{stream, FutureExt, StreamExt};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::ingest::dedup::{sort_articles, RunDedup};
use crate::ingest::fetch::TieredFetcher;
use crate::ingest::keywords::KeywordMatcher;
use crate::ingest::recency::RecencyWindow;
use crate::ingest::tier::domain_of;
use crate::ingest::types::{
    Article, ErrorRecord, ErrorType, FeedKind, FeedSource, RawEntry, SkipReason,
};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_feeds_total", "Feeds processed.");
        describe_counter!("ingest_fetch_errors_total", "Feeds whose every fetch tier failed.");
        describe_counter!("ingest_parse_errors_total", "Feeds that yielded no entries.");
        describe_counter!("ingest_parse_warnings_total", "Malformed feeds that still yielded entries.");
        describe_counter!("ingest_entries_total", "Entries read from feeds.");
        describe_counter!("ingest_skipped_total", "Entries dropped by normalization or filters.");
        describe_counter!("ingest_kept_total", "Articles kept after filtering and dedup.");
        describe_counter!("ingest_dedup_total", "Articles removed as run-level duplicates.");
        describe_counter!("ingest_tier_failures_total", "Failed fetch attempts per tier.");
        describe_histogram!("ingest_fetch_ms", "Successful fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("ingest_pipeline_last_run_ts", "Unix ts when the ingest pipeline last ran.");
    });
}

/// Result of one run, before anything is written.
#[derive(Debug, Default)]
pub struct RunOutput {
    pub articles: Vec<Article>,
    pub errors: Vec<ErrorRecord>,
    pub stats: RunStats,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub feeds_total: usize,
    pub feeds_ok: usize,
    pub entries: usize,
    pub skipped: HashMap<SkipReason, usize>,
    pub duplicates: usize,
}

/// Per-feed outcome: candidate articles (or skip reasons) in entry order,
/// or the error that stopped the feed.
type FeedOutcome = Result<Vec<Result<Article, SkipReason>>, ErrorRecord>;

/// Serializes requests per host and spaces them by the polite delay.
struct HostGate {
    delay: Duration,
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>>,
}

impl HostGate {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    async fn run<F: Future>(&self, host: &str, fut: F) -> F::Output {
        let slot = {
            let mut map = self.hosts.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(host.to_string()).or_default().clone()
        };
        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        let out = fut.await;
        *last = Some(Instant::now());
        out
    }
}

/// The ingestion pipeline for one feed kind.
pub struct Pipeline {
    kind: FeedKind,
    fetcher: TieredFetcher,
    keywords: KeywordMatcher,
    days_limit: i64,
    max_snippet_len: usize,
    max_entries: usize,
    polite_delay: Duration,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        kind: FeedKind,
        cfg: &PipelineConfig,
        fetcher: TieredFetcher,
        keywords: KeywordMatcher,
    ) -> Self {
        Self {
            kind,
            fetcher,
            keywords,
            days_limit: cfg.days_limit,
            max_snippet_len: cfg.max_snippet_len,
            max_entries: cfg.max_entries,
            polite_delay: cfg.polite_delay(kind),
            concurrency: cfg.concurrency.max(1),
        }
    }

    /// Normalize and filter one entry. Skips are expected noise, not errors.
    pub fn build_article(
        &self,
        feed: &FeedSource,
        entry: &RawEntry,
        window: &RecencyWindow,
    ) -> Result<Article, SkipReason> {
        let title = normalize::extract_title(entry);
        if title.is_empty() {
            return Err(SkipReason::MissingTitle);
        }
        let url = normalize::extract_link(entry);
        if url.is_empty() {
            return Err(SkipReason::MissingLink);
        }

        let raw_date = normalize::recency_date(entry).ok_or(SkipReason::MissingDate)?;
        if !window.admits(&raw_date) {
            return Err(SkipReason::NotRecent);
        }
        let date_published = normalize::storage_date(entry).ok_or(SkipReason::MissingDate)?;

        let snippet = normalize::extract_snippet(entry, self.max_snippet_len);

        let (trigger_keywords, source_domain) = match self.kind {
            FeedKind::Rss => {
                let triggered = self.keywords.triggers(&title, &snippet);
                if triggered.is_empty() {
                    return Err(SkipReason::NoTrigger);
                }
                let domain = if feed.domain.is_empty() {
                    normalize::source_domain(&url)
                } else {
                    feed.domain.clone()
                };
                (triggered.join(", "), domain)
            }
            FeedKind::GoogleAlerts => (feed.label.clone(), normalize::source_domain(&url)),
        };

        Ok(Article {
            trigger_keywords,
            title,
            snippet,
            date_published,
            source_domain,
            url,
            in_roundup: String::new(),
        })
    }

    async fn process_feed(&self, feed: &FeedSource, window: &RecencyWindow) -> FeedOutcome {
        let error = |error_type: ErrorType, message: String| ErrorRecord {
            feed_url: feed.url.clone(),
            label: feed.label.clone(),
            error_type,
            error_message: message,
        };

        let fetched = match self.fetcher.fetch(&feed.url).await {
            Ok(f) => f,
            Err(failure) => {
                warn!(target: "ingest", url = %feed.url, error = %failure, "fetch failed");
                counter!("ingest_fetch_errors_total").increment(1);
                return Err(error(ErrorType::Fetch, failure.to_string()));
            }
        };
        debug!(target: "ingest", url = %feed.url, tier = %fetched.tier, bytes = fetched.bytes.len(), "fetched");

        let parsed = parser::parse_feed(&fetched.bytes, self.max_entries);
        if parsed.entries.is_empty() {
            let message = parsed
                .error
                .unwrap_or_else(|| "no entries found".to_string());
            warn!(target: "ingest", url = %feed.url, error = %message, "parse failed");
            counter!("ingest_parse_errors_total").increment(1);
            return Err(error(ErrorType::Parse, message));
        }
        if parsed.malformed {
            warn!(
                target: "ingest",
                url = %feed.url,
                entries = parsed.entries.len(),
                error = parsed.error.as_deref().unwrap_or_default(),
                "parse warning, entries present"
            );
            counter!("ingest_parse_warnings_total").increment(1);
        }

        Ok(parsed
            .entries
            .iter()
            .map(|entry| self.build_article(feed, entry, window))
            .collect())
    }

    /// Process one feed; a panic inside is reported as an `exception` error.
    async fn guarded(&self, feed: &FeedSource, window: &RecencyWindow) -> FeedOutcome {
        counter!("ingest_feeds_total").increment(1);
        match AssertUnwindSafe(self.process_feed(feed, window))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(target: "ingest", url = %feed.url, error = %message, "feed processing panicked");
                Err(ErrorRecord {
                    feed_url: feed.url.clone(),
                    label: feed.label.clone(),
                    error_type: ErrorType::Exception,
                    error_message: message,
                })
            }
        }
    }

    /// Run every feed and return sorted, deduplicated articles plus errors.
    pub async fn run(&self, feeds: &[FeedSource], today: NaiveDate) -> RunOutput {
        ensure_metrics_described();
        let window = RecencyWindow::new(self.days_limit, today);
        let total = feeds.len();

        let mut outcomes: Vec<(usize, FeedOutcome)> = if self.concurrency <= 1 {
            let mut v = Vec::with_capacity(total);
            for (idx, feed) in feeds.iter().enumerate() {
                info!(target: "ingest", "[{}/{}] processing {} ({})", idx + 1, total, feed.url, feed.label);
                v.push((idx, self.guarded(feed, &window).await));
                if idx + 1 < total && !self.polite_delay.is_zero() {
                    tokio::time::sleep(self.polite_delay).await;
                }
            }
            v
        } else {
            let gate = HostGate::new(self.polite_delay);
            let gate = &gate;
            let window = &window;
            stream::iter(feeds.iter().enumerate())
                .map(|(idx, feed)| async move {
                    let host = domain_of(&feed.url);
                    let outcome = gate.run(&host, self.guarded(feed, window)).await;
                    (idx, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await
        };
        // Dedup in feed-list order so the surviving duplicate never depends
        // on which fetch finished first.
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut out = RunOutput::default();
        out.stats.feeds_total = total;
        let mut dedup = RunDedup::new();

        for (_, outcome) in outcomes {
            match outcome {
                Err(e) => out.errors.push(e),
                Ok(candidates) => {
                    out.stats.feeds_ok += 1;
                    out.stats.entries += candidates.len();
                    for candidate in candidates {
                        match candidate {
                            Ok(article) => {
                                if dedup.admit(&article) {
                                    out.articles.push(article);
                                } else {
                                    out.stats.duplicates += 1;
                                    *out.stats.skipped.entry(SkipReason::Duplicate).or_default() += 1;
                                }
                            }
                            Err(reason) => {
                                *out.stats.skipped.entry(reason).or_default() += 1;
                            }
                        }
                    }
                }
            }
        }

        sort_articles(&mut out.articles, self.kind);

        let skipped: usize = out.stats.skipped.values().sum();
        counter!("ingest_skipped_total").increment(skipped as u64);
        counter!("ingest_kept_total").increment(out.articles.len() as u64);
        counter!("ingest_dedup_total").increment(out.stats.duplicates as u64);
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        info!(
            target: "ingest",
            kind = ?self.kind,
            feeds_ok = out.stats.feeds_ok,
            feeds_total = total,
            articles = out.articles.len(),
            errors = out.errors.len(),
            duplicates = out.stats.duplicates,
            "ingest run finished"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tier::HardenedList;

    fn pipeline(kind: FeedKind) -> Pipeline {
        let fetcher = TieredFetcher::with_chains(HardenedList::default(), vec![], vec![]);
        Pipeline::new(
            kind,
            &PipelineConfig::default(),
            fetcher,
            KeywordMatcher::new(["solar", "wind & grid"]),
        )
    }

    fn entry(title: &str, link: &str, date: &str, summary: &str) -> RawEntry {
        RawEntry {
            title: Some(title.into()),
            link: Some(link.into()),
            published: Some(date.into()),
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn rss_article_gets_sorted_triggers_and_feed_domain() {
        let p = pipeline(FeedKind::Rss);
        let feed = FeedSource {
            url: "https://feeds.example.com/rss".into(),
            label: "example.com".into(),
            domain: "example.com".into(),
        };
        let w = RecencyWindow::new(1, today());
        let a = p
            .build_article(
                &feed,
                &entry("Solar boom", "https://example.com/a", "2024-06-10", "<p>Wind feeds the grid</p>"),
                &w,
            )
            .unwrap();
        assert_eq!(a.trigger_keywords, "solar, wind & grid");
        assert_eq!(a.source_domain, "example.com");
        assert_eq!(a.snippet, "Wind feeds the grid");
    }

    #[test]
    fn skip_reasons() {
        let p = pipeline(FeedKind::Rss);
        let feed = FeedSource {
            url: "u".into(),
            label: String::new(),
            domain: String::new(),
        };
        let w = RecencyWindow::new(1, today());
        let no_hit = entry("Hydro news", "https://e.com/1", "2024-06-10", "");
        assert_eq!(p.build_article(&feed, &no_hit, &w), Err(SkipReason::NoTrigger));
        let old = entry("Solar", "https://e.com/2", "2024-05-01", "");
        assert_eq!(p.build_article(&feed, &old, &w), Err(SkipReason::NotRecent));
        let untitled = entry("  ", "https://e.com/3", "2024-06-10", "");
        assert_eq!(p.build_article(&feed, &untitled, &w), Err(SkipReason::MissingTitle));
        let mut undated = entry("Solar", "https://e.com/4", "", "");
        undated.published = None;
        assert_eq!(p.build_article(&feed, &undated, &w), Err(SkipReason::MissingDate));
    }

    #[test]
    fn mislabeled_weekday_is_kept_and_junk_date_is_skipped() {
        let p = pipeline(FeedKind::Rss);
        let feed = FeedSource {
            url: "u".into(),
            label: String::new(),
            domain: "e.com".into(),
        };
        let w = RecencyWindow::new(1, today());
        // 2024-06-10 was a Monday.
        let wrong_day = entry("Solar", "https://e.com/1", "Fri, 10 Jun 2024 10:00:00 GMT", "");
        let a = p.build_article(&feed, &wrong_day, &w).unwrap();
        assert_eq!(a.date_published, today());

        let junk = entry("Solar", "https://e.com/2", "Updated: soon", "");
        assert_eq!(p.build_article(&feed, &junk, &w), Err(SkipReason::NotRecent));
    }

    #[test]
    fn google_article_uses_alert_label_and_link_domain() {
        let p = pipeline(FeedKind::GoogleAlerts);
        let feed = FeedSource {
            url: "https://www.google.com/alerts/feeds/1/2".into(),
            label: "hydro power".into(),
            domain: String::new(),
        };
        let w = RecencyWindow::new(1, today());
        let e = entry(
            "Dam &amp; river",
            "https://www.google.com/url?rct=j&q=&url=https://www.news.org/x&sa=U",
            "2024-06-09T08:00:00Z",
            "",
        );
        let a = p.build_article(&feed, &e, &w).unwrap();
        assert_eq!(a.trigger_keywords, "hydro power");
        assert_eq!(a.title, "Dam & river");
        assert_eq!(a.url, "https://www.news.org/x");
        assert_eq!(a.source_domain, "news.org");
        assert_eq!(a.date_published, NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
    }
}
