//! Ranking of processed tickers and the dated CSV snapshot.
//!
//! `process_stock_data` turns one fetched snapshot into either a scored stock
//! or an explicit skip; nothing in here panics on bad input.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::metrics::{self, MetricError};
use crate::models::{PriceSeries, ProcessedStock, RankedStock, StockFundamentals, StockSnapshot};

/// Why a ticker was left out of the ranking
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("fundamentals could not be fetched")]
    MissingFundamentals,

    #[error("price history could not be fetched")]
    MissingPrices,

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("need two closes with a positive previous close, got {0} closes")]
    InsufficientPrices(usize),

    #[error("metric undefined: {0}")]
    Undefined(#[from] MetricError),

    #[error("negative metric (earnings yield {earnings_yield:.4}, roc {roc:.4})")]
    Negative { earnings_yield: f64, roc: f64 },
}

/// Result of scoring one ticker
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Processed(ProcessedStock),
    Skipped { ticker: String, reason: SkipReason },
}

impl ProcessOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            ProcessOutcome::Processed(stock) => &stock.ticker,
            ProcessOutcome::Skipped { ticker, .. } => ticker,
        }
    }
}

/// Compute price change and both Magic Formula ratios for one ticker
pub fn process_stock_data(snapshot: &StockSnapshot) -> ProcessOutcome {
    match score(snapshot) {
        Ok(stock) => ProcessOutcome::Processed(stock),
        Err(reason) => ProcessOutcome::Skipped {
            ticker: snapshot.ticker.clone(),
            reason,
        },
    }
}

fn score(snapshot: &StockSnapshot) -> Result<ProcessedStock, SkipReason> {
    let overview = snapshot
        .overview
        .as_ref()
        .ok_or(SkipReason::MissingFundamentals)?;
    let time_series = snapshot
        .time_series
        .as_ref()
        .ok_or(SkipReason::MissingPrices)?;

    let fundamentals =
        StockFundamentals::from_overview(&snapshot.ticker, overview).map_err(SkipReason::Malformed)?;
    let prices = PriceSeries::from_daily(time_series).map_err(SkipReason::Malformed)?;

    let (latest, previous) = match (prices.latest(), prices.previous()) {
        (Some(latest), Some(previous)) if previous.close > 0.0 => (latest.close, previous.close),
        _ => return Err(SkipReason::InsufficientPrices(prices.len())),
    };
    let pct_change = (latest - previous) / previous * 100.0;

    let earnings_yield = metrics::earnings_yield(fundamentals.ebit, fundamentals.enterprise_value)?;
    let roc = metrics::return_on_capital(
        fundamentals.ebit,
        fundamentals.net_fixed_assets,
        fundamentals.working_capital,
    )?;

    if earnings_yield < 0.0 || roc < 0.0 {
        return Err(SkipReason::Negative { earnings_yield, roc });
    }

    Ok(ProcessedStock {
        ticker: snapshot.ticker.clone(),
        price: latest,
        pct_change,
        earnings_yield,
        roc,
    })
}

/// Sort by earnings yield, then return on capital, both descending, and
/// number the result from 1. The sort is stable.
pub fn rank_stocks(mut stocks: Vec<ProcessedStock>) -> Vec<RankedStock> {
    stocks.sort_by(|a, b| {
        b.earnings_yield
            .total_cmp(&a.earnings_yield)
            .then_with(|| b.roc.total_cmp(&a.roc))
    });

    stocks
        .into_iter()
        .zip(1u32..)
        .map(|(stock, rank)| RankedStock { stock, rank })
        .collect()
}

#[derive(Debug, Serialize)]
struct RankedRow<'a> {
    #[serde(rename = "Ticker")]
    ticker: &'a str,
    #[serde(rename = "Price")]
    price: f64,
    #[serde(rename = "PctChange")]
    pct_change: f64,
    #[serde(rename = "EarningsYield")]
    earnings_yield: f64,
    #[serde(rename = "ROC")]
    roc: f64,
    #[serde(rename = "Rank")]
    rank: u32,
}

pub fn ranked_csv_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("ranked_stocks_{}.csv", date.format("%Y%m%d")))
}

/// Write (overwrite) the dated ranking snapshot
pub fn save_ranked_stocks(dir: &Path, date: NaiveDate, ranked: &[RankedStock]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = ranked_csv_path(dir, date);

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
    writer.write_record(["Ticker", "Price", "PctChange", "EarningsYield", "ROC", "Rank"])?;
    for ranked_stock in ranked {
        let stock = &ranked_stock.stock;
        writer.serialize(RankedRow {
            ticker: &stock.ticker,
            price: stock.price,
            pct_change: stock.pct_change,
            earnings_yield: stock.earnings_yield,
            roc: stock.roc,
            rank: ranked_stock.rank,
        })?;
    }
    writer.flush()?;

    Ok(path)
}
