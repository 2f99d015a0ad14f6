//! Pipeline orchestration for production and fixture-replay runs.
//!
//! Only composing or sending the digest can fail a run. Everything upstream
//! (a ticker that cannot be fetched or scored, a CSV that cannot be written,
//! a news request that errors) is logged and the run carries on with less.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::api::{news_client, AlphaVantageClient, NewsClient, NewsProvider, StockDataProvider};
use crate::database::{HistoryStore, TOP_RANK};
use crate::digest::{compose_digest, render_digest, DigestEntry};
use crate::mailer::{MailTransport, Mailer, SmtpMailTransport};
use crate::models::{Config, NewsArticle, ProcessedStock, RankedStock};
use crate::processor::{process_stock_data, rank_stocks, save_ranked_stocks, ProcessOutcome};

/// Production run against the real APIs and SMTP server, dated today
pub async fn run_production(config: &Config) -> bool {
    let stock_client = match AlphaVantageClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Alpha Vantage client: {}", e);
            return false;
        }
    };
    let news_client = match NewsClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create news client: {}", e);
            return false;
        }
    };
    let transport = match SmtpMailTransport::new(config) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to create SMTP transport: {}", e);
            return false;
        }
    };

    let today = Local::now().date_naive();
    run_pipeline(config, &stock_client, &news_client, &transport, today).await
}

/// Fetch, score, rank, persist, gather news, compose and mail
pub async fn run_pipeline(
    config: &Config,
    stocks: &dyn StockDataProvider,
    news: &dyn NewsProvider,
    transport: &dyn MailTransport,
    date: NaiveDate,
) -> bool {
    info!("Starting digest run for {} ({} tickers)", date, config.tickers.len());

    let processed = collect_stocks(config, stocks).await;
    let ranked = rank_stocks(processed);
    info!("Ranked {} of {} tickers", ranked.len(), config.tickers.len());

    let store = match HistoryStore::open(&config.history_db_path()).await {
        Ok(store) => Some(store),
        Err(e) => {
            error!("Failed to open history store: {}", e);
            None
        }
    };

    persist_rankings(config, store.as_ref(), &ranked, date).await;
    save_top_news(config, news, &ranked, date).await;

    let Some(store) = store else {
        error!("Cannot compose digest without the history store");
        return false;
    };

    let report = match compose_digest(&store, news, date).await {
        Ok(report) => report,
        Err(e) => {
            error!("Failed to compose digest: {}", e);
            store.close().await;
            return false;
        }
    };
    store.close().await;

    let mailer = Mailer::new(transport, config.smtp_user.clone(), config.mail_retry_delay);
    match mailer
        .send(&config.to_email, &report.subject, &report.plain_text, &report.html)
        .await
    {
        Ok(delivery) => {
            info!("Successfully sent daily digest ({} attempt(s))", delivery.attempts);
            true
        }
        Err(e) => {
            error!("Failed to send daily digest: {}", e);
            false
        }
    }
}

async fn collect_stocks(config: &Config, stocks: &dyn StockDataProvider) -> Vec<ProcessedStock> {
    let mut processed = Vec::new();

    for ticker in &config.tickers {
        let snapshot = stocks.fetch(ticker).await;
        match process_stock_data(&snapshot) {
            ProcessOutcome::Processed(stock) => {
                info!(
                    "{}: earnings yield {:.4}, roc {:.4}",
                    stock.ticker, stock.earnings_yield, stock.roc
                );
                processed.push(stock);
            }
            ProcessOutcome::Skipped { ticker, reason } => {
                warn!("Skipping {}: {}", ticker, reason);
            }
        }
    }

    processed
}

async fn persist_rankings(
    config: &Config,
    store: Option<&HistoryStore>,
    ranked: &[RankedStock],
    date: NaiveDate,
) {
    match save_ranked_stocks(&config.processed_dir(), date, ranked) {
        Ok(path) => info!("Saved ranked stocks to {}", path.display()),
        Err(e) => error!("Failed to save ranked stocks CSV: {}", e),
    }

    if let Some(store) = store {
        if let Err(e) = store.append_rankings(date, ranked).await {
            error!("Failed to append rankings to history: {}", e);
        }
    }
}

async fn save_top_news(config: &Config, news: &dyn NewsProvider, ranked: &[RankedStock], date: NaiveDate) {
    let dir = config.processed_dir();

    for ranked_stock in ranked.iter().take(TOP_RANK as usize) {
        let ticker = &ranked_stock.stock.ticker;
        let articles = news.fetch(ticker).await;
        if let Err(e) = news_client::save_news(&dir, date, ticker, &articles) {
            error!("Failed to save news for {}: {}", ticker, e);
        }
    }
}

/// Render the digest from fixture files and write it to disk instead of mailing
pub async fn run_test_mode(config: &Config) -> bool {
    info!("Running in test mode");

    match write_fixture_digest(config, Local::now().date_naive()) {
        Ok(path) => {
            info!("Test email saved to {}", path.display());
            true
        }
        Err(e) => {
            error!("Test mode failed: {:#}", e);
            false
        }
    }
}

/// Returns the path of the written HTML body
pub fn write_fixture_digest(config: &Config, date: NaiveDate) -> Result<PathBuf> {
    let entries = load_fixture_entries(config)?;
    let report = render_digest(date, &entries)?;

    std::fs::create_dir_all(&config.test_output_dir)
        .with_context(|| format!("creating {}", config.test_output_dir.display()))?;
    let html_path = config.test_output_dir.join("test_email.html");
    std::fs::write(&html_path, &report.html)?;
    std::fs::write(config.test_output_dir.join("test_email.txt"), &report.plain_text)?;

    Ok(html_path)
}

fn load_fixture_entries(config: &Config) -> Result<Vec<DigestEntry>> {
    let stocks_path = config.fixtures_dir.join("mock_stocks.json");
    let news_path = config.fixtures_dir.join("mock_news.json");

    let stocks_json = std::fs::read_to_string(&stocks_path)
        .with_context(|| format!("reading {}", stocks_path.display()))?;
    let news_json = std::fs::read_to_string(&news_path)
        .with_context(|| format!("reading {}", news_path.display()))?;

    let mut entries: Vec<DigestEntry> = serde_json::from_str(&stocks_json)
        .with_context(|| format!("parsing {}", stocks_path.display()))?;
    let mut news: HashMap<String, Vec<NewsArticle>> = serde_json::from_str(&news_json)
        .with_context(|| format!("parsing {}", news_path.display()))?;

    entries.sort_by_key(|e| e.rank);
    entries.truncate(TOP_RANK as usize);
    for entry in &mut entries {
        let articles = news.remove(&entry.ticker).unwrap_or_default();
        entry.news = news_client::filter_trusted(articles);
    }

    Ok(entries)
}
