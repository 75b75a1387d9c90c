// src/ingest/tier.rs
//! Transport tier selection: decides whether a feed needs the heavy fetch path.

use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Hardened,
}

/// Lowercase scheme/host, strip a trailing slash on the path (except root),
/// keep the query. Unparseable input falls back to trimmed lowercase.
pub fn normalize_url(u: &str) -> String {
    let u = u.trim();
    if u.is_empty() {
        return String::new();
    }
    match Url::parse(u) {
        Ok(p) => {
            let path = p.path();
            let path = if path.len() > 1 && path.ends_with('/') {
                &path[..path.len() - 1]
            } else {
                path
            };
            let mut host = p.host_str().unwrap_or_default().to_ascii_lowercase();
            if let Some(port) = p.port() {
                host = format!("{host}:{port}");
            }
            let mut out = format!("{}://{}{}", p.scheme().to_ascii_lowercase(), host, path);
            if let Some(q) = p.query().filter(|q| !q.is_empty()) {
                out.push('?');
                out.push_str(q);
            }
            out
        }
        Err(_) => u.to_lowercase(),
    }
}

/// Network location (host plus explicit port) of a URL, lowercased.
pub fn domain_of(u: &str) -> String {
    match Url::parse(u.trim()) {
        Ok(p) => {
            let host = p.host_str().unwrap_or_default().to_ascii_lowercase();
            match p.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            }
        }
        Err(_) => String::new(),
    }
}

/// Allow-list of feeds known to block plain HTTP clients.
/// Built once per run; lookups are exact on normalized URL or domain.
#[derive(Debug, Clone, Default)]
pub struct HardenedList {
    urls: HashSet<String>,
    domains: HashSet<String>,
}

impl HardenedList {
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: HashSet<String> = urls
            .into_iter()
            .map(|u| normalize_url(u.as_ref()))
            .filter(|u| !u.is_empty())
            .collect();
        let domains = urls
            .iter()
            .map(|u| domain_of(u))
            .filter(|d| !d.is_empty())
            .collect();
        Self { urls, domains }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn classify(&self, target: &str) -> Tier {
        let nu = normalize_url(target);
        if self.urls.contains(&nu) || self.domains.contains(&domain_of(&nu)) {
            Tier::Hardened
        } else {
            Tier::Standard
        }
    }
}
