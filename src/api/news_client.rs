use anyhow::Result;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use super::{build_http_client, build_url, NewsProvider};
use crate::models::{Config, NewsArticle};

/// NewsAPI source ids requested server-side
pub const REQUESTED_SOURCES: &str = "bloomberg,reuters,cnbc,marketwatch";

/// Source names accepted in the digest, whatever the server returned
pub const TRUSTED_SOURCES: &[&str] = &["Bloomberg", "Reuters", "CNBC", "MarketWatch", "CNN"];

/// NewsAPI `/v2/everything` response
#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    source: Option<RawSource>,
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl RawArticle {
    fn into_article(self) -> Option<NewsArticle> {
        Some(NewsArticle {
            title: self.title.filter(|t| !t.is_empty())?,
            source: self.source.and_then(|s| s.name).unwrap_or_default(),
            url: self.url.filter(|u| !u.is_empty())?,
        })
    }
}

/// NewsAPI client
pub struct NewsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NewsClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: config.news_api_key.clone(),
            base_url: config.news_api_base_url.clone(),
        })
    }

    async fn request(&self, ticker: &str) -> Result<Vec<NewsArticle>> {
        let url = build_url(
            &self.base_url,
            "/v2/everything",
            &[
                ("q", ticker),
                ("sources", REQUESTED_SOURCES),
                ("apiKey", self.api_key.as_str()),
            ],
        )?;

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: EverythingResponse = response.json().await?;

        Ok(body
            .articles
            .into_iter()
            .filter_map(RawArticle::into_article)
            .collect())
    }
}

#[async_trait::async_trait]
impl NewsProvider for NewsClient {
    async fn fetch(&self, ticker: &str) -> Vec<NewsArticle> {
        match self.request(ticker).await {
            Ok(articles) => {
                let trusted = filter_trusted(articles);
                debug!("Fetched {} trusted articles for {}", trusted.len(), ticker);
                trusted
            }
            Err(e) => {
                error!("Failed to fetch news for {}: {}", ticker, e);
                Vec::new()
            }
        }
    }
}

pub fn is_trusted_source(name: &str) -> bool {
    TRUSTED_SOURCES.contains(&name)
}

/// Keep only articles from trusted outlets, preserving order
pub fn filter_trusted(articles: Vec<NewsArticle>) -> Vec<NewsArticle> {
    articles
        .into_iter()
        .filter(|a| is_trusted_source(&a.source))
        .collect()
}

#[derive(Debug, Serialize)]
struct NewsRow<'a> {
    #[serde(rename = "Ticker")]
    ticker: &'a str,
    #[serde(rename = "Headline")]
    headline: &'a str,
    #[serde(rename = "Source")]
    source: &'a str,
    #[serde(rename = "URL")]
    url: &'a str,
}

pub fn news_csv_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("news_{}.csv", date.format("%Y%m%d")))
}

/// Append a ticker's articles to the day's news CSV.
/// The header is only written when the file is created by this call.
pub fn save_news(dir: &Path, date: NaiveDate, ticker: &str, articles: &[NewsArticle]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = news_csv_path(dir, date);
    let is_new = !path.exists();

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if is_new {
        writer.write_record(["Ticker", "Headline", "Source", "URL"])?;
    }
    for article in articles {
        writer.serialize(NewsRow {
            ticker,
            headline: &article.title,
            source: &article.source,
            url: &article.url,
        })?;
    }
    writer.flush()?;

    Ok(path)
}
