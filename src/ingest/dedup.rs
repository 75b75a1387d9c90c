// src/ingest/dedup.rs
use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;

use crate::ingest::types::{Article, FeedKind};

/// Run-level duplicate suppression: an article repeats if its URL or its
/// (lowercased title, date) pair was already admitted. First one wins.
#[derive(Debug, Default)]
pub struct RunDedup {
    seen_urls: HashSet<String>,
    seen_title_dates: HashSet<(String, NaiveDate)>,
}

impl RunDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, article: &Article) -> bool {
        let url = article.url.trim().to_string();
        let key = (article.title.trim().to_lowercase(), article.date_published);
        if self.seen_urls.contains(&url) || self.seen_title_dates.contains(&key) {
            return false;
        }
        self.seen_urls.insert(url);
        self.seen_title_dates.insert(key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_urls.is_empty()
    }
}

/// Output order, applied after all filtering. RSS digests group by trigger
/// keywords; Google Alerts digests read best alphabetically by title.
pub fn sort_articles(articles: &mut [Article], kind: FeedKind) {
    articles.sort_by(|a, b| match kind {
        FeedKind::Rss => cmp_lower(&a.trigger_keywords, &b.trigger_keywords)
            .then_with(|| a.date_published.cmp(&b.date_published))
            .then_with(|| cmp_lower(&a.title, &b.title)),
        FeedKind::GoogleAlerts => cmp_lower(&a.title, &b.title),
    });
}

fn cmp_lower(a: &str, b: &str) -> Ordering {
    a.trim().to_lowercase().cmp(&b.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(title: &str, url: &str, day: u32) -> Article {
        Article {
            trigger_keywords: "solar".into(),
            title: title.into(),
            snippet: String::new(),
            date_published: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            source_domain: "example.com".into(),
            url: url.into(),
            in_roundup: String::new(),
        }
    }

    #[test]
    fn url_or_title_date_repeat_is_rejected() {
        let mut d = RunDedup::new();
        assert!(d.admit(&art("Solar up", "https://a/1", 4)));
        assert!(!d.admit(&art("Other", "https://a/1", 4)));
        assert!(!d.admit(&art("SOLAR UP", "https://a/2", 4)));
        assert!(d.admit(&art("Solar up", "https://a/3", 5)));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn google_sort_is_by_title() {
        let mut v = vec![art("beta", "u1", 4), art("Alpha", "u2", 5)];
        sort_articles(&mut v, FeedKind::GoogleAlerts);
        assert_eq!(v[0].title, "Alpha");
    }
}
