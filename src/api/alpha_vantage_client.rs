use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::{build_http_client, build_url, get_json, retry_with_backoff, StockDataProvider};
use crate::models::{Config, StockSnapshot};

/// Alpha Vantage endpoints used by the digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaVantageFunction {
    Overview,
    TimeSeriesDaily,
}

impl AlphaVantageFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlphaVantageFunction::Overview => "OVERVIEW",
            AlphaVantageFunction::TimeSeriesDaily => "TIME_SERIES_DAILY",
        }
    }
}

/// Alpha Vantage API client
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    attempts: u32,
    backoff: Duration,
    raw_dir: PathBuf,
}

impl AlphaVantageClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: config.alpha_vantage_api_key.clone(),
            base_url: config.alpha_vantage_base_url.clone(),
            attempts: config.fetch_attempts,
            backoff: config.fetch_backoff,
            raw_dir: config.raw_stocks_dir(),
        })
    }

    /// Fetch one endpoint, retrying up to the configured number of attempts
    pub async fn get_function(&self, function: AlphaVantageFunction, symbol: &str) -> Option<Value> {
        let url = match build_url(
            &self.base_url,
            "/query",
            &[
                ("function", function.as_str()),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ],
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build {} url for {}: {}", function.as_str(), symbol, e);
                return None;
            }
        };

        let client = &self.client;
        let url = &url;
        let context = format!("{} {}", function.as_str(), symbol);

        retry_with_backoff(&context, self.attempts, self.backoff, move || async move {
            let body = get_json(client, url).await?;
            check_api_envelope(&body)?;
            Ok(body)
        })
        .await
    }

    /// Best-effort audit copy of both raw responses
    fn save_raw(&self, snapshot: &StockSnapshot) {
        if let (Some(overview), Some(time_series)) = (&snapshot.overview, &snapshot.time_series) {
            let raw = json!({
                "OVERVIEW": overview,
                "TIME_SERIES_DAILY": time_series,
            });
            match write_raw_file(&self.raw_dir, &snapshot.ticker, &raw) {
                Ok(path) => info!("Saved raw data for {} to {}", snapshot.ticker, path.display()),
                Err(e) => warn!("Failed to save raw data for {}: {}", snapshot.ticker, e),
            }
        }
    }
}

#[async_trait::async_trait]
impl StockDataProvider for AlphaVantageClient {
    async fn fetch(&self, ticker: &str) -> StockSnapshot {
        let overview = self.get_function(AlphaVantageFunction::Overview, ticker).await;
        let time_series = self
            .get_function(AlphaVantageFunction::TimeSeriesDaily, ticker)
            .await;

        let snapshot = StockSnapshot {
            ticker: ticker.to_string(),
            overview,
            time_series,
        };
        self.save_raw(&snapshot);
        snapshot
    }
}

/// Alpha Vantage answers throttling and bad symbols with HTTP 200 and a
/// one-key object (`Note`, `Information` or `Error Message`).
fn check_api_envelope(body: &Value) -> Result<()> {
    let object = body
        .as_object()
        .ok_or_else(|| anyhow!("response is not a JSON object"))?;

    for key in ["Error Message", "Note", "Information"] {
        if let Some(message) = object.get(key) {
            return Err(anyhow!("Alpha Vantage {}: {}", key, message));
        }
    }

    if object.is_empty() {
        return Err(anyhow!("empty response"));
    }

    Ok(())
}

fn write_raw_file(dir: &Path, ticker: &str, raw: &Value) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", ticker));
    std::fs::write(&path, serde_json::to_string_pretty(raw)?)?;
    Ok(path)
}
