//! End-to-end runs with fake data sources and mail transport

use magic_formula_digest::database::HistoryStore;
use magic_formula_digest::runner::{run_pipeline, write_fixture_digest};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use test_log::test;

use crate::common::fakes::{FakeNews, FakeStockData, RecordingTransport};
use crate::common::{logging, test_data};

fn stock_data() -> FakeStockData {
    FakeStockData::default()
        // earnings yield 0.10, roc 0.40
        .with(test_data::snapshot("AAPL", 1_000.0, 10_000.0, 2_000.0, 500.0, 110.0, 100.0))
        // earnings yield 0.20, roc 0.20
        .with(test_data::snapshot("MSFT", 2_000.0, 10_000.0, 8_000.0, 2_000.0, 99.0, 100.0))
        // negative EBIT
        .with(test_data::snapshot("TSLA", -500.0, 10_000.0, 2_000.0, 500.0, 200.0, 210.0))
}

fn news() -> FakeNews {
    FakeNews::default()
        .with("AAPL", vec![test_data::article("Reuters", "Apple earnings beat")])
        .with("MSFT", vec![test_data::article("Bloomberg", "Microsoft cloud")])
}

#[test(tokio::test)]
async fn test_production_pipeline_end_to_end() {
    logging::log_test_step("Running the full pipeline against fakes");

    let dir = tempfile::tempdir().unwrap();
    // GOOGL has no data at all and must simply be skipped
    let config = test_data::config(dir.path(), &["AAPL", "MSFT", "TSLA", "GOOGL"]);
    let news = news();
    let transport = RecordingTransport::failing(0);

    let ok = run_pipeline(&config, &stock_data(), &news, &transport, test_data::run_date()).await;
    assert!(ok, "pipeline should succeed when mail is delivered");

    // Ranked CSV: MSFT first on earnings yield, TSLA excluded
    let ranked_csv = std::fs::read_to_string(config.processed_dir().join("ranked_stocks_20240301.csv")).unwrap();
    let lines: Vec<&str> = ranked_csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Ticker,Price,PctChange,EarningsYield,ROC,Rank");
    let fields = |line: &str| line.split(',').map(str::to_string).collect::<Vec<_>>();
    let msft = fields(lines[1]);
    let aapl = fields(lines[2]);
    assert_eq!((msft[0].as_str(), msft[5].as_str()), ("MSFT", "1"));
    assert_eq!((aapl[0].as_str(), aapl[5].as_str()), ("AAPL", "2"));
    assert_eq!(aapl[1].parse::<f64>().unwrap(), 110.0);

    // History store holds exactly the ranked tickers
    let store = HistoryStore::open(&config.history_db_path()).await.unwrap();
    let top = store.top_ranked(10).await.unwrap();
    let tickers: Vec<&str> = top.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["MSFT", "AAPL"]);
    store.close().await;

    // News saved once per top ticker, then fetched again for the digest
    let news_csv = std::fs::read_to_string(config.processed_dir().join("news_20240301.csv")).unwrap();
    assert_eq!(news_csv.lines().filter(|l| l.starts_with("Ticker,")).count(), 1);
    assert!(news_csv.contains("AAPL,Apple earnings beat,Reuters"));
    assert_eq!(news.requests(), vec!["MSFT", "AAPL", "MSFT", "AAPL"]);

    // One email with both bodies
    assert_eq!(transport.attempts(), 1);
    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].contains("To: reader@example.com"));
    assert!(delivered[0].contains("multipart/alternative"));
}

#[tokio::test]
async fn test_mail_retry_recovers_from_one_failure() {
    let (logs, _guard) = logging::capture();
    let dir = tempfile::tempdir().unwrap();
    let config = test_data::config(dir.path(), &["AAPL"]);
    let transport = RecordingTransport::failing(1);

    let ok = run_pipeline(&config, &stock_data(), &news(), &transport, test_data::run_date()).await;

    assert!(ok);
    assert_eq!(transport.attempts(), 2);
    assert_eq!(transport.delivered().len(), 1);

    let errors: Vec<String> = logs.lines().into_iter().filter(|l| l.contains("ERROR")).collect();
    assert_eq!(errors.len(), 1, "unexpected error lines: {:?}", errors);
    assert!(errors[0].contains("Failed to send"));
    assert!(errors[0].contains("421 service not available"));
    assert!(logs.lines().iter().any(|l| l.contains("on retry")));
}

#[test(tokio::test)]
async fn test_run_fails_when_mail_fails_twice() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_data::config(dir.path(), &["AAPL", "MSFT"]);
    let transport = RecordingTransport::failing(2);

    let ok = run_pipeline(&config, &stock_data(), &news(), &transport, test_data::run_date()).await;

    assert!(!ok, "a send that fails twice marks the run failed");
    assert_eq!(transport.attempts(), 2);
    assert!(transport.delivered().is_empty());
    // Upstream persistence still happened
    assert!(config.processed_dir().join("ranked_stocks_20240301.csv").exists());
}

#[test(tokio::test)]
async fn test_pipeline_with_no_usable_tickers_still_sends() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_data::config(dir.path(), &["NOPE"]);
    let transport = RecordingTransport::failing(0);

    let ok = run_pipeline(&config, &FakeStockData::default(), &FakeNews::default(), &transport, test_data::run_date()).await;

    assert!(ok);
    assert!(transport.delivered()[0].contains("No ranked stocks available."));
}

#[test]
fn test_fixture_digest_written_to_disk() {
    logging::log_test_step("Rendering the fixture digest");

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_data::config(dir.path(), &[]);
    config.fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");

    let html_path = write_fixture_digest(&config, test_data::run_date()).unwrap();
    assert_eq!(html_path, config.test_output_dir.join("test_email.html"));

    let html = std::fs::read_to_string(&html_path).unwrap();
    let plain = std::fs::read_to_string(config.test_output_dir.join("test_email.txt")).unwrap();

    // Fixture rows come back in rank order
    let aapl = html.find("<td>AAPL</td>").unwrap();
    let msft = html.find("<td>MSFT</td>").unwrap();
    assert!(aapl < msft);
    assert!(plain.contains("Ranked top 10 for 18 days"));
    // Untrusted fixture article filtered out, special characters escaped in HTML
    assert!(!html.contains("Ten reasons to buy Apple now"));
    assert!(html.contains("Alphabet &amp; regulators"));
    assert!(!html.contains("what's next"));
    assert!(plain.contains("Alphabet & regulators: what's next"));
}

#[test]
fn test_fixture_digest_missing_fixtures_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_data::config(dir.path(), &[]);
    config.fixtures_dir = dir.path().join("does-not-exist");

    assert!(write_fixture_digest(&config, test_data::run_date()).is_err());
}
