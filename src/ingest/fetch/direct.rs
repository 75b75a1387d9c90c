// src/ingest/fetch/direct.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::{browser_headers, read_body, FetchFailure, FetchStrategy, FetchTier};
use crate::config::FetchConfig;

/// Plain GET with a realistic browser header set.
pub struct DirectFetch {
    client: Client,
}

impl DirectFetch {
    pub fn new(cfg: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .default_headers(browser_headers(cfg)?)
            .timeout(cfg.timeout())
            .build()
            .context("building direct fetch client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchStrategy for DirectFetch {
    fn tier(&self) -> FetchTier {
        FetchTier::Direct
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::from_reqwest(FetchTier::Direct, e))?;
        read_body(FetchTier::Direct, resp).await
    }
}
