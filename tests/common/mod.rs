//! Common test utilities and helpers


/// Test data utilities
pub mod test_data {
    use chrono::NaiveDate;
    use magic_formula_digest::models::{Config, NewsArticle, ProcessedStock, StockSnapshot};
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    /// Snapshot shaped like the two Alpha Vantage responses
    pub fn snapshot(
        ticker: &str,
        ebit: f64,
        enterprise_value: f64,
        net_fixed_assets: f64,
        working_capital: f64,
        latest_close: f64,
        previous_close: f64,
    ) -> StockSnapshot {
        StockSnapshot {
            ticker: ticker.to_string(),
            overview: Some(json!({
                "Symbol": ticker,
                "EBIT": ebit.to_string(),
                "EnterpriseValue": enterprise_value.to_string(),
                "NetFixedAssets": net_fixed_assets.to_string(),
                "WorkingCapital": working_capital.to_string(),
            })),
            time_series: Some(json!({
                "Meta Data": {"2. Symbol": ticker},
                "Time Series (Daily)": {
                    "2024-03-01": {"4. close": latest_close.to_string()},
                    "2024-02-29": {"4. close": previous_close.to_string()},
                }
            })),
        }
    }

    pub fn processed(ticker: &str, earnings_yield: f64, roc: f64) -> ProcessedStock {
        ProcessedStock {
            ticker: ticker.to_string(),
            price: 100.0,
            pct_change: 1.5,
            earnings_yield,
            roc,
        }
    }

    pub fn article(source: &str, title: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            source: source.to_string(),
            url: format!("https://news.example/{}", title.replace(' ', "-").to_lowercase()),
        }
    }

    pub fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    /// Config rooted in a temporary data directory with no waiting between retries
    pub fn config(data_dir: &Path, tickers: &[&str]) -> Config {
        Config {
            smtp_user: "digest@example.com".to_string(),
            to_email: "reader@example.com".to_string(),
            data_dir: data_dir.to_path_buf(),
            test_output_dir: data_dir.join("output"),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            fetch_backoff: Duration::ZERO,
            mail_retry_delay: Duration::ZERO,
            ..Config::default()
        }
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info};
    use tracing::subscriber::DefaultGuard;

    /// In-memory sink for formatted log lines
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn lines(&self) -> Vec<String> {
            self.0
                .lock()
                .map(|buf| String::from_utf8_lossy(&buf).lines().map(str::to_string).collect())
                .unwrap_or_default()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            if let Ok(mut buf) = self.0.lock() {
                buf.extend_from_slice(data);
            }
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Route this thread's events into a buffer until the guard drops.
    /// Use from a current-thread runtime so every poll sees the subscriber.
    pub fn capture() -> (CapturedLogs, DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    /// Log test data
    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}
