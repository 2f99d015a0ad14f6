use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::models::{NewsArticle, StockSnapshot};

pub mod alpha_vantage_client;
pub mod news_client;

pub use alpha_vantage_client::AlphaVantageClient;
pub use news_client::NewsClient;

/// Source of per-ticker fundamentals and price history
#[async_trait::async_trait]
pub trait StockDataProvider: Send + Sync {
    /// Never fails: halves that could not be fetched are left as `None`
    async fn fetch(&self, ticker: &str) -> StockSnapshot;
}

/// Source of per-ticker news headlines
#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    /// Never fails: an unreachable news service yields no articles
    async fn fetch(&self, ticker: &str) -> Vec<NewsArticle>;
}

/// Shared HTTP client for the data providers
pub(crate) fn build_http_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(concat!("magic-formula-digest/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Build `<base><path>?<params>` with proper query encoding
pub(crate) fn build_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    let base = base.trim_end_matches('/');
    Url::parse_with_params(&format!("{}{}", base, path), params)
        .map_err(|e| anyhow!("Invalid API url {}{}: {}", base, path, e))
}

/// GET a JSON document once
pub(crate) async fn get_json(client: &Client, url: &Url) -> Result<Value> {
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("HTTP error {}: {}", status, body));
    }

    Ok(response.json::<Value>().await?)
}

/// Bounded retry with a fixed backoff between attempts.
///
/// Every failed attempt is logged with `context`; the backoff is only slept
/// when another attempt follows. Returns `None` once all attempts failed.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    context: &str,
    attempts: u32,
    backoff: Duration,
    mut operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                debug!("{} succeeded on attempt {}", context, attempt);
                return Some(value);
            }
            Err(e) => {
                error!("Attempt {}/{} failed for {}: {}", attempt, attempts, context, e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    None
}
