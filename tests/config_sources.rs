// tests/config_sources.rs
use std::fs;

use news_digest::config::{load_feed_sources, load_hardened_urls, load_keywords, ConfigError};
use news_digest::ingest::tier::{HardenedList, Tier};
use news_digest::FeedKind;

#[test]
fn rss_list_keeps_only_rss_yes_rows() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("feeds.csv");
    fs::write(
        &p,
        "\u{feff}Feed_URL,Domain,RSS\n\
         https://a.example.com/rss, a.example.com ,yes\n\
         https://b.example.com/rss,b.example.com,no\n\
         ,c.example.com,yes\n\
         https://d.example.com/rss,d.example.com,YES\n",
    )
    .unwrap();

    let feeds = load_feed_sources(&p, FeedKind::Rss).unwrap();
    let urls: Vec<&str> = feeds.iter().map(|f| f.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.example.com/rss", "https://d.example.com/rss"]);
    assert_eq!(feeds[0].domain, "a.example.com");
}

#[test]
fn google_list_uses_keywords_as_label() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("alerts.csv");
    fs::write(
        &p,
        "feed_url,keywords,source\nhttps://www.google.com/alerts/feeds/1/2,hydro power,google\n",
    )
    .unwrap();
    let feeds = load_feed_sources(&p, FeedKind::GoogleAlerts).unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].label, "hydro power");
}

#[test]
fn empty_inputs_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = dir.path().join("feeds.csv");
    fs::write(&feeds, "feed_url,domain,rss\nhttps://x/rss,x,no\n").unwrap();
    assert!(matches!(
        load_feed_sources(&feeds, FeedKind::Rss),
        Err(ConfigError::Empty { .. })
    ));

    let kw = dir.path().join("kw.csv");
    fs::write(&kw, "word\n\n").unwrap();
    assert!(matches!(load_keywords(&kw), Err(ConfigError::Empty { .. })));

    assert!(matches!(
        load_keywords(&dir.path().join("missing.csv")),
        Err(ConfigError::Open { .. })
    ));
}

#[test]
fn keywords_are_lowercased_and_unique() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("kw.csv");
    fs::write(&p, "word\nSolar\nsolar\nWind & Grid\n").unwrap();
    assert_eq!(load_keywords(&p).unwrap(), vec!["solar", "wind & grid"]);
}

#[test]
fn hardened_list_falls_back_to_first_column() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("hardened.csv");
    fs::write(&p, "url\nhttps://Locked.example.com/feed/\n").unwrap();
    let urls = load_hardened_urls(&p).unwrap();
    let list = HardenedList::from_urls(&urls);
    assert_eq!(list.classify("https://locked.example.com/feed"), Tier::Hardened);
    assert_eq!(list.classify("https://open.example.com/feed"), Tier::Standard);

    assert!(load_hardened_urls(&dir.path().join("absent.csv")).unwrap().is_empty());
}
