//! Digest composition: the day's top ten joined with consistency and news,
//! rendered as a plain-text body and an HTML table.

use anyhow::Result;
use chrono::NaiveDate;
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::NewsProvider;
use crate::database::{HistoryStore, TOP_RANK};
use crate::models::{DigestReport, NewsArticle};

/// One ticker's section of the digest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DigestEntry {
    pub ticker: String,
    pub earnings_yield: f64,
    pub roc: f64,
    pub rank: u32,
    pub consistency: i64,
    #[serde(default)]
    pub news: Vec<NewsArticle>,
}

pub fn digest_subject(date: NaiveDate) -> String {
    format!("Magic Formula Daily Digest – {}", date.format("%Y-%m-%d"))
}

/// Read the latest top ten from history, fetch fresh news for each, render
pub async fn compose_digest(
    store: &HistoryStore,
    news: &dyn NewsProvider,
    date: NaiveDate,
) -> Result<DigestReport> {
    let top = store.top_ranked(TOP_RANK).await?;
    let mut entries = Vec::with_capacity(top.len());

    for record in top {
        let consistency = store.consistency(&record.ticker).await?;
        let articles = news.fetch(&record.ticker).await;
        entries.push(DigestEntry {
            ticker: record.ticker,
            earnings_yield: record.earnings_yield,
            roc: record.roc,
            rank: record.rank,
            consistency,
            news: articles,
        });
    }

    info!("Composed digest with {} stocks", entries.len());
    render_digest(date, &entries)
}

const PLAIN_TEMPLATE: &str = "digest.txt";
const HTML_TEMPLATE: &str = "digest.html";

/// Template view of one entry, with figures already formatted
#[derive(Debug, Serialize)]
struct EntryView<'a> {
    rank: u32,
    ticker: &'a str,
    earnings_yield: String,
    roc: String,
    why: String,
    recommendation: String,
    news: &'a [NewsArticle],
}

impl<'a> From<&'a DigestEntry> for EntryView<'a> {
    fn from(entry: &'a DigestEntry) -> Self {
        Self {
            rank: entry.rank,
            ticker: &entry.ticker,
            earnings_yield: format!("{:.2}", entry.earnings_yield * 100.0),
            roc: format!("{:.2}", entry.roc * 100.0),
            why: why_this_stock(entry),
            recommendation: recommendation(entry),
            news: &entry.news,
        }
    }
}

/// Both digest templates. The `.html` one is auto-escaped.
fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.add_template(PLAIN_TEMPLATE, include_str!("../templates/digest.txt"))?;
    env.add_template(HTML_TEMPLATE, include_str!("../templates/digest.html"))?;
    Ok(env)
}

/// Render both bodies from already-joined entries
pub fn render_digest(date: NaiveDate, entries: &[DigestEntry]) -> Result<DigestReport> {
    let env = environment()?;
    let subject = digest_subject(date);
    let views: Vec<EntryView> = entries.iter().map(EntryView::from).collect();
    let ctx = context! {
        subject => &subject,
        entries => &views,
    };

    let plain_text = env.get_template(PLAIN_TEMPLATE)?.render(&ctx)?;
    let html = env.get_template(HTML_TEMPLATE)?.render(&ctx)?;

    Ok(DigestReport {
        subject,
        plain_text,
        html,
    })
}

fn why_this_stock(entry: &DigestEntry) -> String {
    format!("High ROC of {:.1}%", entry.roc * 100.0)
}

fn recommendation(entry: &DigestEntry) -> String {
    let unit = if entry.consistency == 1 { "day" } else { "days" };
    format!("Ranked top 10 for {} {}", entry.consistency, unit)
}
