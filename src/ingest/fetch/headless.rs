// src/ingest/fetch/headless.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{origin_of, status_kind, FailureKind, FetchFailure, FetchStrategy, FetchTier};
use crate::config::FetchConfig;

/// Drives a throwaway headless Chromium to issue the feed request from
/// inside a page on the feed's own origin. Each call launches its own
/// browser process; `browser_slots` bounds how many run at once.
pub struct HeadlessFetch {
    slots: Arc<Semaphore>,
    timeout: Duration,
    chrome: Option<PathBuf>,
    user_agent: String,
    accept: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    status: u16,
    body: String,
}

fn browser_failure(e: impl std::fmt::Display) -> FetchFailure {
    FetchFailure::new(FailureKind::Browser, FetchTier::Headless, e.to_string())
}

impl HeadlessFetch {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(cfg.browser_slots.max(1))),
            timeout: cfg.timeout(),
            chrome: cfg.chrome_executable.clone(),
            user_agent: cfg.user_agent.clone(),
            accept: cfg.accept.clone(),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchFailure> {
        let mut builder = BrowserConfig::builder().args(vec![
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
            "--no-first-run".to_string(),
            format!("--user-agent={}", self.user_agent),
        ]);
        if let Some(bin) = &self.chrome {
            builder = builder.chrome_executable(bin);
        }
        if std::env::var("CI").is_ok() || std::env::var("NO_SANDBOX").is_ok() {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(browser_failure)
    }

    /// In-page script: same-origin `fetch` of the feed, returning status and text.
    fn script(&self, url: &str) -> Result<String, FetchFailure> {
        let url = serde_json::to_string(url).map_err(browser_failure)?;
        let accept = serde_json::to_string(&self.accept).map_err(browser_failure)?;
        Ok(format!(
            "(async () => {{ const r = await fetch({url}, {{ credentials: 'include', headers: {{ 'Accept': {accept} }} }}); \
             return {{ status: r.status, body: await r.text() }}; }})()"
        ))
    }

    async fn fetch_in_browser(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(browser_failure)?;
        let pump = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.request_in_page(&browser, url).await;

        if let Err(e) = browser.close().await {
            debug!(target: "fetch", error = %e, "browser close failed");
        }
        let _ = browser.wait().await;
        pump.abort();

        result
    }

    async fn request_in_page(&self, browser: &Browser, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let origin = origin_of(url).unwrap_or_else(|| "about:blank".to_string());
        let page = browser
            .new_page(origin.as_str())
            .await
            .map_err(browser_failure)?;

        let script = self.script(url)?;
        let resp: PageResponse = page
            .evaluate(script.as_str())
            .await
            .map_err(browser_failure)?
            .into_value()
            .map_err(browser_failure)?;

        let status = reqwest::StatusCode::from_u16(resp.status).map_err(browser_failure)?;
        if !status.is_success() {
            return Err(FetchFailure::new(
                status_kind(status),
                FetchTier::Headless,
                format!("browser request failed: HTTP {}", resp.status),
            ));
        }
        info!(target: "fetch", url, bytes = resp.body.len(), "headless fetch ok");
        Ok(resp.body.into_bytes())
    }
}

#[async_trait]
impl FetchStrategy for HeadlessFetch {
    fn tier(&self) -> FetchTier {
        FetchTier::Headless
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let _permit = self.slots.acquire().await.map_err(browser_failure)?;
        match tokio::time::timeout(self.timeout, self.fetch_in_browser(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::new(
                FailureKind::Timeout,
                FetchTier::Headless,
                format!("browser fetch timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }
}
