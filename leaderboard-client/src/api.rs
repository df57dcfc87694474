use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::models::{PlayerPage, ResetResponse};

/// REST calls against the leaderboard backend.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, path))
            .with_context(|| format!("invalid endpoint {}", path))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!(%url, "backend request");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {} failed", url.path()))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "{} failed ({})",
                url.path(),
                response.status()
            ));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let path = url.path().to_string();
        let response = self.get(url).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("invalid response from {}", path))
    }

    pub async fn fetch_page(&self, offset: u64, limit: u64) -> Result<PlayerPage> {
        let url = self.endpoint(
            "/api/players",
            &[("top", limit.to_string()), ("offset", offset.to_string())],
        )?;
        self.get_json(url).await
    }

    pub async fn fetch_top(&self, n: u64) -> Result<PlayerPage> {
        self.fetch_page(0, n).await
    }

    pub async fn reset(&self) -> Result<ResetResponse> {
        let url = self.endpoint("/api/players/reset", &[])?;
        self.get_json(url).await
    }

    /// Progress arrives on the `simulate` channel; the body is ignored.
    pub async fn simulate(&self) -> Result<()> {
        let url = self.endpoint("/api/players/simulate", &[])?;
        self.get(url).await?;
        Ok(())
    }

    pub async fn distribute(&self, ratio: u32) -> Result<PlayerPage> {
        let url = self.endpoint(
            "/api/players/calculate-prize-pool",
            &[("ratio", ratio.to_string())],
        )?;
        self.get_json(url).await
    }
}
