//! Shared HTTP plumbing for OpenAI-compatible endpoints.
//!
//! Retry strategy (used by both chat completions and embeddings):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// Read `OPENAI_API_KEY` from the environment.
pub fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))
}

/// POST `body` to `{base_url}/{path}` and return the decoded JSON response.
pub async fn post_json(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    api_key: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), path);
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(%status, attempt, "retrying OpenAI request");
                    last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                    continue;
                }

                bail!("OpenAI API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("OpenAI request failed after retries")))
}
