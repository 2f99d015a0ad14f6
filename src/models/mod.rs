use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Tickers scored when `TICKERS` is not set
pub const DEFAULT_TICKERS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

/// Raw Alpha Vantage documents for one ticker, as returned by the fetcher.
/// Either half is `None` when every attempt for it failed.
#[derive(Debug, Clone, Default)]
pub struct StockSnapshot {
    pub ticker: String,
    pub overview: Option<Value>,
    pub time_series: Option<Value>,
}

/// Company fundamentals used by the Magic Formula
#[derive(Debug, Clone, PartialEq)]
pub struct StockFundamentals {
    pub ticker: String,
    pub ebit: f64,
    pub enterprise_value: f64,
    pub net_fixed_assets: f64,
    pub working_capital: f64,
}

impl StockFundamentals {
    /// Parse an Alpha Vantage `OVERVIEW` document.
    ///
    /// Absent fields count as zero. Alpha Vantage reports numbers as strings
    /// and uses `"None"` for unknown values, which is rejected.
    pub fn from_overview(ticker: &str, overview: &Value) -> Result<Self, String> {
        let object = overview
            .as_object()
            .ok_or_else(|| "OVERVIEW response is not an object".to_string())?;

        let field = |name: &str| -> Result<f64, String> {
            match object.get(name) {
                None | Some(Value::Null) => Ok(0.0),
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| format!("{} is not a finite number", name)),
                Some(Value::String(s)) => parse_finite(s)
                    .ok_or_else(|| format!("{} has non-numeric value {:?}", name, s)),
                Some(other) => Err(format!("{} has unexpected value {}", name, other)),
            }
        };

        Ok(Self {
            ticker: ticker.to_string(),
            ebit: field("EBIT")?,
            enterprise_value: field("EnterpriseValue")?,
            net_fixed_assets: field("NetFixedAssets")?,
            working_capital: field("WorkingCapital")?,
        })
    }
}

/// `str::parse` accepts "NaN" and "inf"; neither is a usable figure here
fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One daily close
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes ordered most-recent-first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    closes: Vec<DailyClose>,
}

impl PriceSeries {
    pub fn new(mut closes: Vec<DailyClose>) -> Self {
        closes.sort_by(|a, b| b.date.cmp(&a.date));
        Self { closes }
    }

    /// Parse the `Time Series (Daily)` section of a `TIME_SERIES_DAILY` document.
    /// Entries are ordered by their date keys, not by JSON object order.
    pub fn from_daily(time_series: &Value) -> Result<Self, String> {
        let series = time_series
            .get("Time Series (Daily)")
            .and_then(Value::as_object)
            .ok_or_else(|| "missing \"Time Series (Daily)\" section".to_string())?;

        let mut closes = Vec::with_capacity(series.len());
        for (date_str, bar) in series {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| format!("bad date key {:?}: {}", date_str, e))?;
            let close = match bar.get("4. close") {
                Some(Value::String(s)) => parse_finite(s)
                    .ok_or_else(|| format!("close on {} is not numeric: {:?}", date_str, s))?,
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| format!("close on {} is not finite", date_str))?,
                _ => return Err(format!("missing close on {}", date_str)),
            };
            closes.push(DailyClose { date, close });
        }

        Ok(Self::new(closes))
    }

    pub fn latest(&self) -> Option<&DailyClose> {
        self.closes.first()
    }

    pub fn previous(&self) -> Option<&DailyClose> {
        self.closes.get(1)
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// A ticker that survived metric computation, before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedStock {
    pub ticker: String,
    pub price: f64,
    pub pct_change: f64,
    pub earnings_yield: f64,
    pub roc: f64,
}

/// A processed ticker with its 1-based position in the day's ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStock {
    pub stock: ProcessedStock,
    pub rank: u32,
}

/// One persisted row of the ranking history
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub earnings_yield: f64,
    pub roc: f64,
    pub rank: u32,
}

/// News article as kept by the digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub source: String,
    pub url: String,
}

/// Composed report, consumed by the mailer (or written to disk in test mode)
#[derive(Debug, Clone, PartialEq)]
pub struct DigestReport {
    pub subject: String,
    pub plain_text: String,
    pub html: String,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_base_url: String,
    pub news_api_key: String,
    pub news_api_base_url: String,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub to_email: String,
    pub data_dir: PathBuf,
    pub fixtures_dir: PathBuf,
    pub test_output_dir: PathBuf,
    pub tickers: Vec<String>,
    pub fetch_attempts: u32,
    pub fetch_backoff: Duration,
    pub mail_retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha_vantage_api_key: String::new(),
            alpha_vantage_base_url: "https://www.alphavantage.co".to_string(),
            news_api_key: String::new(),
            news_api_base_url: "https://newsapi.org".to_string(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            to_email: String::new(),
            data_dir: PathBuf::from("data"),
            fixtures_dir: PathBuf::from("tests/fixtures"),
            test_output_dir: PathBuf::from("tests/output"),
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            fetch_attempts: 3,
            fetch_backoff: Duration::from_secs(2),
            mail_retry_delay: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Credentials are not checked here; a missing key shows up as a failed
    /// request when the component that needs it runs.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Config::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Config {
            alpha_vantage_api_key: var("ALPHA_VANTAGE_API_KEY").unwrap_or_default(),
            alpha_vantage_base_url: var("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or(defaults.alpha_vantage_base_url),
            news_api_key: var("NEWS_API_KEY").unwrap_or_default(),
            news_api_base_url: var("NEWS_API_BASE_URL").unwrap_or(defaults.news_api_base_url),
            smtp_user: var("SMTP_USER").unwrap_or_default(),
            smtp_password: var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_host: var("SMTP_HOST").unwrap_or(defaults.smtp_host),
            smtp_port: var("SMTP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.smtp_port),
            to_email: var("TO_EMAIL").unwrap_or_default(),
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            fixtures_dir: var("FIXTURES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fixtures_dir),
            test_output_dir: var("TEST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.test_output_dir),
            tickers: var("TICKERS")
                .map(|v| parse_tickers(&v))
                .filter(|t| !t.is_empty())
                .unwrap_or(defaults.tickers),
            fetch_attempts: var("FETCH_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fetch_attempts),
            fetch_backoff: var("FETCH_BACKOFF_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_backoff),
            mail_retry_delay: var("MAIL_RETRY_DELAY_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.mail_retry_delay),
        }
    }

    pub fn raw_stocks_dir(&self) -> PathBuf {
        self.data_dir.join("raw_stocks")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("system.log")
    }
}

/// Split a comma separated ticker list, upper-casing and dropping blanks
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}
