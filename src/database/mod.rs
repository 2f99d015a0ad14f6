use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::path::Path;
use tracing::info;

use crate::models::{RankedStock, RankingRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Rank at or above which a ticker counts towards its consistency
pub const TOP_RANK: u32 = 10;

/// Append-only ranking history backed by SQLite
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (creating if needed) the history database and its schema
    pub async fn open(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(database_path)
                    .create_if_missing(true),
            )
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_rankings (
                date TEXT NOT NULL,
                ticker TEXT NOT NULL,
                earnings_yield REAL NOT NULL,
                roc REAL NOT NULL,
                rank INTEGER NOT NULL,
                UNIQUE(date, ticker)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stock_rankings_ticker ON stock_rankings(ticker, rank)")
            .execute(&pool)
            .await?;

        info!("History store ready at {}", database_path.display());
        Ok(Self { pool })
    }

    /// Append one row per ranked stock for `date`.
    ///
    /// Rows already present for (date, ticker) are left untouched, so
    /// re-running on the same day never rewrites history. Any other
    /// constraint failure aborts the whole batch. Returns the number of rows
    /// actually inserted.
    pub async fn append_rankings(&self, date: NaiveDate, ranked: &[RankedStock]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for ranked_stock in ranked {
            let result = sqlx::query(
                r#"
                INSERT INTO stock_rankings (date, ticker, earnings_yield, roc, rank)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(date, ticker) DO NOTHING
                "#,
            )
            .bind(date)
            .bind(&ranked_stock.stock.ticker)
            .bind(ranked_stock.stock.earnings_yield)
            .bind(ranked_stock.stock.roc)
            .bind(i64::from(ranked_stock.rank))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        info!("Appended {} ranking rows for {}", inserted, date);
        Ok(inserted)
    }

    /// Most recent date with any ranking
    pub async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let row = sqlx::query("SELECT MAX(date) AS latest FROM stock_rankings")
            .fetch_one(&self.pool)
            .await?;
        let latest: Option<String> = row.try_get("latest")?;
        latest.map(|s| parse_date(&s)).transpose()
    }

    /// Best `limit` rows of the most recent date, in rank order
    pub async fn top_ranked(&self, limit: u32) -> Result<Vec<RankingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT date, ticker, earnings_yield, roc, rank
            FROM stock_rankings
            WHERE date = (SELECT MAX(date) FROM stock_rankings)
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RankingRecord> {
                let date: String = row.try_get("date")?;
                let rank: i64 = row.try_get("rank")?;
                Ok(RankingRecord {
                    date: parse_date(&date)?,
                    ticker: row.try_get("ticker")?,
                    earnings_yield: row.try_get("earnings_yield")?,
                    roc: row.try_get("roc")?,
                    rank: u32::try_from(rank).map_err(|_| anyhow!("invalid rank {}", rank))?,
                })
            })
            .collect()
    }

    /// Number of distinct dates on which `ticker` ranked in the top ten
    pub async fn consistency(&self, ticker: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT date) AS days FROM stock_rankings WHERE ticker = ? AND rank <= ?",
        )
        .bind(ticker)
        .bind(i64::from(TOP_RANK))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("days")?)
    }

    pub async fn row_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM stock_rankings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| anyhow!("bad stored date {:?}: {}", s, e))
}
