// src/ingest/normalize.rs
//! Pure extraction of article fields from a [`RawEntry`].

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::ingest::dates;
use crate::ingest::types::RawEntry;

/// HTML to plain text: strip tags, decode entities, NFKC, collapse whitespace.
pub fn html_to_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<!--.*?-->|</?[a-z!][^>]*>").unwrap());
    // Tags first so decoded "&lt;b&gt;" text is not mistaken for markup.
    let out = re_tags.replace_all(s, " ");
    let out = html_escape::decode_html_entities(&out);
    let out: String = out.nfkc().collect();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Cut to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Unwrap `https://www.google.com/url?q=<target>&...` style redirectors.
pub fn unwrap_redirect(link: &str) -> String {
    let link = link.trim();
    let Ok(parsed) = Url::parse(link) else {
        return link.to_string();
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if !(host.ends_with("google.com") && parsed.path().starts_with("/url")) {
        return link.to_string();
    }
    for key in ["q", "url"] {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim().to_string());
        if let Some(t) = target.filter(|t| !t.is_empty()) {
            return t;
        }
    }
    link.to_string()
}

/// Primary link, else first alternate; redirect wrappers unwrapped.
pub fn extract_link(entry: &RawEntry) -> String {
    let link = entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| {
            entry
                .alternate_links
                .first()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
        });
    match link {
        Some(l) => unwrap_redirect(l),
        None => String::new(),
    }
}

/// Host of a URL: lowercased, `www.` and port stripped.
pub fn source_domain(url: &str) -> String {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Date string used for the recency test: published, updated, then the
/// parsed moments rendered as ISO-8601.
pub fn recency_date(entry: &RawEntry) -> Option<String> {
    for raw in [&entry.published, &entry.updated].into_iter().flatten() {
        if !raw.trim().is_empty() {
            return Some(raw.clone());
        }
    }
    [&entry.published_parsed, &entry.updated_parsed]
        .into_iter()
        .flatten()
        .next()
        .map(dates::to_iso)
}

/// Calendar date stored on the article. String forms win over parsed ones.
pub fn storage_date(entry: &RawEntry) -> Option<NaiveDate> {
    for raw in [&entry.published, &entry.updated].into_iter().flatten() {
        if let Some(d) = dates::parse_date(raw) {
            return Some(d);
        }
    }
    [&entry.published_parsed, &entry.updated_parsed]
        .into_iter()
        .flatten()
        .next()
        .map(|dt| dt.date())
}

/// First content block, else summary, else description; first non-empty wins.
pub fn extract_snippet(entry: &RawEntry, max_len: usize) -> String {
    let candidates = entry
        .content
        .first()
        .into_iter()
        .chain(entry.summary.iter())
        .chain(entry.description.iter());
    for c in candidates {
        let text = truncate_chars(&html_to_text(c), max_len);
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    String::new()
}

pub fn extract_title(entry: &RawEntry) -> String {
    entry
        .title
        .as_deref()
        .map(|t| html_escape::decode_html_entities(t).trim().to_string())
        .unwrap_or_default()
}
