// src/config/sources.rs
//! Flat CSV inputs: feed list, keyword list, hardened allow-list.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::ingest::types::{FeedKind, FeedSource};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path} has no usable rows")]
    Empty { path: PathBuf },
}

fn reader(path: &Path) -> Result<csv::Reader<File>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Header names lowercased, trimmed and BOM-stripped.
fn headers(rdr: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>, ConfigError> {
    let h = rdr.headers().map_err(|source| ConfigError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(h.iter()
        .map(|s| s.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect())
}

fn column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Load configured feeds.
///
/// RSS lists carry `feed_url, domain, rss` and only rows with `rss == yes`
/// count. Google Alerts lists carry `feed_url, keywords, source`.
pub fn load_feed_sources(path: &Path, kind: FeedKind) -> Result<Vec<FeedSource>, ConfigError> {
    let mut rdr = reader(path)?;
    let headers = headers(&mut rdr, path)?;
    let url_col = column(&headers, "feed_url");
    let domain_col = column(&headers, "domain");
    let rss_col = column(&headers, "rss");
    let keywords_col = column(&headers, "keywords");
    let source_col = column(&headers, "source");

    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let url = cell(&rec, url_col);
        if url.is_empty() {
            continue;
        }
        let feed = match kind {
            FeedKind::Rss => {
                if !cell(&rec, rss_col).eq_ignore_ascii_case("yes") {
                    continue;
                }
                let domain = cell(&rec, domain_col);
                FeedSource {
                    url,
                    label: domain.clone(),
                    domain,
                }
            }
            FeedKind::GoogleAlerts => FeedSource {
                url,
                label: cell(&rec, keywords_col),
                domain: cell(&rec, source_col),
            },
        };
        out.push(feed);
    }

    if out.is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(out)
}

/// Keyword list from the `word` column, lowercased and deduplicated.
pub fn load_keywords(path: &Path) -> Result<Vec<String>, ConfigError> {
    let mut rdr = reader(path)?;
    let headers = headers(&mut rdr, path)?;
    let word_col = column(&headers, "word").or(Some(0));

    let mut set = BTreeSet::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let w = cell(&rec, word_col).to_lowercase();
        if !w.is_empty() {
            set.insert(w);
        }
    }
    if set.is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(set.into_iter().collect())
}

/// Hardened feed URLs from the `feed_url` column, else the first column.
/// A missing file means no hardened feeds.
pub fn load_hardened_urls(path: &Path) -> Result<Vec<String>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = reader(path)?;
    let headers = headers(&mut rdr, path)?;
    let col = column(&headers, "feed_url").or(Some(0));

    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let v = cell(&rec, col);
        if !v.is_empty() {
            out.push(v);
        }
    }
    Ok(out)
}
