//! Remote page retrieval.
//!
//! The harvester and fetchers only see the [`PageSource`] trait: give it a
//! URL, get back the rendered markup (or raw bytes for downloads). The HTTP
//! implementation below is the production one; tests substitute canned pages.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Something that can turn a URL into page markup or bytes.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Load a page and return its markup.
    async fn fetch_html(&self, url: &str) -> Result<String>;

    /// Download a binary resource.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`PageSource`] backed by a plain `reqwest` client.
///
/// Each request is bounded by the configured page-load timeout.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let user_agent = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, url);
        }
        Ok(response)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.get(url)
            .await?
            .text()
            .await
            .context("Failed to read response body")
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .context("Failed to read response body")?;
        Ok(bytes.to_vec())
    }
}

/// Sleep after a navigation so client-side rendering can settle.
pub async fn settle(wait_ms: u64) {
    if wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    }
}
