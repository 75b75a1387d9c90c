// src/ingest/fetch/mod.rs
//! Tiered feed fetching.
//!
//! A fetch runs an ordered chain of [`FetchStrategy`] values and stops at the
//! first success. Standard sources try a direct request and escalate to the
//! cookie-carrying client only on access denial; hardened sources go straight
//! to the headless browser.

pub mod antibot;
pub mod direct;
pub mod headless;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::ingest::tier::{HardenedList, Tier};

pub use antibot::AntiBotFetch;
pub use direct::DirectFetch;
pub use headless::HeadlessFetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchTier {
    Direct,
    AntiBot,
    Headless,
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchTier::Direct => "direct",
            FetchTier::AntiBot => "anti-bot",
            FetchTier::Headless => "headless",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 401/403/429: the site is refusing automated clients.
    AccessDenied,
    Status,
    Timeout,
    Network,
    Browser,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{tier} fetch failed: {message}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub tier: FetchTier,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, tier: FetchTier, message: impl Into<String>) -> Self {
        Self {
            kind,
            tier,
            message: message.into(),
        }
    }

    pub(crate) fn from_reqwest(tier: FetchTier, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if let Some(status) = err.status() {
            status_kind(status)
        } else {
            FailureKind::Network
        };
        Self::new(kind, tier, err.to_string())
    }
}

/// Successful fetch: body bytes plus the tier that produced them.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub tier: FetchTier,
}

pub type FetchResult = Result<Fetched, FetchFailure>;

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn tier(&self) -> FetchTier;

    /// Whether this strategy runs after the previous tier failed with `previous`.
    fn takes_over(&self, _previous: &FetchFailure) -> bool {
        true
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure>;
}

pub(crate) fn status_kind(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED | StatusCode::TOO_MANY_REQUESTS => {
            FailureKind::AccessDenied
        }
        _ => FailureKind::Status,
    }
}

/// Read a response body, turning non-2xx statuses into typed failures.
pub(crate) async fn read_body(
    tier: FetchTier,
    resp: reqwest::Response,
) -> Result<Vec<u8>, FetchFailure> {
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchFailure::new(
            status_kind(status),
            tier,
            format!("HTTP {} for {}", status.as_u16(), resp.url()),
        ));
    }
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| FetchFailure::from_reqwest(tier, e))?;
    Ok(bytes.to_vec())
}

/// Browser-like request headers shared by the HTTP tiers.
pub(crate) fn browser_headers(cfg: &FetchConfig) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("user-agent", cfg.user_agent.as_str()),
        ("accept", cfg.accept.as_str()),
        ("accept-language", cfg.accept_language.as_str()),
        ("referer", cfg.referer.as_str()),
    ];
    for (name, value) in pairs {
        if value.is_empty() {
            continue;
        }
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value)
                .map_err(|e| anyhow::anyhow!("invalid {name} header value: {e}"))?,
        );
    }
    Ok(headers)
}

/// `scheme://host[:port]/` of a URL, used to warm up cookies and page origins.
pub(crate) fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(format!("{}/", origin.ascii_serialization()))
}

/// Runs the strategy chain that matches a source's tier.
pub struct TieredFetcher {
    hardened: HardenedList,
    standard_chain: Vec<Arc<dyn FetchStrategy>>,
    hardened_chain: Vec<Arc<dyn FetchStrategy>>,
}

impl TieredFetcher {
    /// Build the production chains from config. With `escalate == false`
    /// every source gets the direct tier only.
    pub fn from_config(
        cfg: &FetchConfig,
        hardened: HardenedList,
        escalate: bool,
    ) -> anyhow::Result<Self> {
        let direct: Arc<dyn FetchStrategy> = Arc::new(DirectFetch::new(cfg)?);
        if !escalate {
            return Ok(Self::with_chains(hardened, vec![direct.clone()], vec![direct]));
        }
        let antibot: Arc<dyn FetchStrategy> = Arc::new(AntiBotFetch::new(cfg)?);
        let headless: Arc<dyn FetchStrategy> = Arc::new(HeadlessFetch::new(cfg));
        Ok(Self::with_chains(
            hardened,
            vec![direct, antibot],
            vec![headless],
        ))
    }

    pub fn with_chains(
        hardened: HardenedList,
        standard_chain: Vec<Arc<dyn FetchStrategy>>,
        hardened_chain: Vec<Arc<dyn FetchStrategy>>,
    ) -> Self {
        Self {
            hardened,
            standard_chain,
            hardened_chain,
        }
    }

    pub fn chain_for(&self, url: &str) -> &[Arc<dyn FetchStrategy>] {
        match self.hardened.classify(url) {
            Tier::Hardened => &self.hardened_chain,
            Tier::Standard => &self.standard_chain,
        }
    }

    pub async fn fetch(&self, url: &str) -> FetchResult {
        let mut last: Option<FetchFailure> = None;

        for strategy in self.chain_for(url) {
            if let Some(prev) = &last {
                if !strategy.takes_over(prev) {
                    break;
                }
                debug!(target: "fetch", url, from = %prev.tier, to = %strategy.tier(), "escalating");
            }

            let t0 = Instant::now();
            match strategy.fetch(url).await {
                Ok(bytes) => {
                    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
                    histogram!("ingest_fetch_ms").record(ms);
                    return Ok(Fetched {
                        bytes,
                        tier: strategy.tier(),
                    });
                }
                Err(failure) => {
                    warn!(target: "fetch", url, tier = %failure.tier, kind = ?failure.kind, error = %failure.message, "tier failed");
                    counter!("ingest_tier_failures_total", "tier" => strategy.tier().to_string())
                        .increment(1);
                    last = Some(failure);
                }
            }
        }

        Err(last.unwrap_or_else(|| {
            FetchFailure::new(
                FailureKind::Network,
                FetchTier::Direct,
                "no fetch strategy configured",
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_keeps_scheme_host_and_port() {
        assert_eq!(
            origin_of("https://Example.com:8443/feed.xml?x=1").as_deref(),
            Some("https://example.com:8443/")
        );
        assert_eq!(origin_of("mailto:a@b.c"), None);
    }

    #[test]
    fn forbidden_is_access_denied() {
        assert_eq!(status_kind(StatusCode::FORBIDDEN), FailureKind::AccessDenied);
        assert_eq!(status_kind(StatusCode::NOT_FOUND), FailureKind::Status);
    }
}
