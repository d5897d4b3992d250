//! Kline synchronization: window parts, merge and partial-failure reuse

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bybit_bulk_downloader::downloader::{
    DownloadError, DownloadJob, DownloaderConfig, RunContext, TaskOutcome, TimeSeriesSync,
};
use bybit_bulk_downloader::fetcher::listing::HtmlDirectoryLister;
use bybit_bulk_downloader::{Category, Interval};
use chrono::Duration;
use tempfile::TempDir;

use crate::common::{kline, series, ts, FakeHttp, FakeMarketData};

const SYMBOL: &str = "BTCUSDT";

fn config(dir: &TempDir) -> DownloaderConfig {
    DownloaderConfig::new(dir.path())
        .with_history(ts(2024, 1, 1), Some(ts(2024, 3, 1)))
        .with_batch_size(4)
}

/// Hourly bars from 2024-01-10 on: 1224 bars, two 1000-hour windows
fn market() -> Arc<FakeMarketData> {
    let market = FakeMarketData::new();
    market.with_klines(
        Category::Linear,
        SYMBOL,
        series(ts(2024, 1, 10), ts(2024, 6, 1), Duration::hours(1), |at, i| {
            kline(at, 100 + i)
        }),
    );
    market
}

#[tokio::test]
async fn test_klines_merged_and_parts_removed() {
    let dir = TempDir::new().unwrap();
    let market = market();
    let sync = TimeSeriesSync::new(market.clone(), &config(&dir));

    let outcome = sync
        .sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
        .await
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Completed);

    let symbol_dir = dir.path().join("bybit_data/klines/linear/BTCUSDT");
    assert!(!symbol_dir.join("60_parts").exists());

    let content = std::fs::read_to_string(symbol_dir.join("60.csv")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        ",startTime,openPrice,highPrice,lowPrice,closePrice,volume,turnover"
    );
    assert_eq!(lines.len(), 1224 + 1);
    assert!(lines[1].starts_with("0,2024-01-10 00:00:00,100,"));
    assert!(lines[1224].starts_with("1223,2024-02-29 23:00:00,1323,"));

    // Rerun is a no-op
    let calls = market.kline_calls.load(Ordering::SeqCst);
    assert_eq!(
        sync.sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
            .await
            .unwrap(),
        TaskOutcome::Skipped
    );
    assert_eq!(market.kline_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_failed_window_keeps_parts_and_next_run_reuses_them() {
    let dir = TempDir::new().unwrap();
    let market = market();
    // Inside the second window
    market.fail_kline_once_at(ts(2024, 2, 25));
    let sync = TimeSeriesSync::new(market.clone(), &config(&dir));

    let err = sync
        .sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Incomplete(_)));

    let symbol_dir = dir.path().join("bybit_data/klines/linear/BTCUSDT");
    assert!(!symbol_dir.join("60.csv").exists());
    let first_part = symbol_dir.join(format!(
        "60_parts/{}_{}.csv",
        ts(2024, 1, 10).timestamp_millis(),
        (ts(2024, 1, 10) + Duration::hours(1000)).timestamp_millis()
    ));
    assert!(first_part.exists());
    assert_eq!(std::fs::read_dir(symbol_dir.join("60_parts")).unwrap().count(), 1);

    // Only the failed window is fetched again: one monthly lookup plus one page
    let before = market.kline_calls.load(Ordering::SeqCst);
    let outcome = sync
        .sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
        .await
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(market.kline_calls.load(Ordering::SeqCst) - before, 2);

    let content = std::fs::read_to_string(symbol_dir.join("60.csv")).unwrap();
    assert_eq!(content.lines().count(), 1224 + 1);
    assert!(!symbol_dir.join("60_parts").exists());
}

#[tokio::test]
async fn test_trailing_part_is_refetched_after_clock_advances() {
    let dir = TempDir::new().unwrap();
    let market = market();
    // Inside the first window, so only the trailing window cut at March 1st survives
    market.fail_kline_once_at(ts(2024, 1, 20));

    let first_run = TimeSeriesSync::new(market.clone(), &config(&dir));
    let err = first_run
        .sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Incomplete(_)));

    let symbol_dir = dir.path().join("bybit_data/klines/linear/BTCUSDT");
    let trailing_start = ts(2024, 1, 10) + Duration::hours(1000);
    let stale_part = symbol_dir.join(format!(
        "60_parts/{}_{}.csv",
        trailing_start.timestamp_millis(),
        ts(2024, 3, 1).timestamp_millis()
    ));
    assert!(stale_part.exists());

    // A later run reaches further: the old trailing part must not stand in for it
    let later = DownloaderConfig::new(dir.path())
        .with_history(ts(2024, 1, 1), Some(ts(2024, 4, 1)))
        .with_batch_size(4);
    let outcome = TimeSeriesSync::new(market.clone(), &later)
        .sync_klines(Category::Linear, Interval::OneHour, SYMBOL)
        .await
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Completed);

    // 2024-01-10 to 2024-04-01 hourly
    let content = std::fs::read_to_string(symbol_dir.join("60.csv")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1968 + 1);
    assert!(lines[1968].starts_with("1967,2024-03-31 23:00:00,"));
    assert!(!symbol_dir.join("60_parts").exists());
}

#[tokio::test]
async fn test_kline_job_counts_symbols_without_data() {
    let dir = TempDir::new().unwrap();
    let market = market();
    market.with_tickers(Category::Linear, &[SYMBOL, "NEWUSDT"]);

    let http = FakeHttp::new();
    let ctx = RunContext::new(
        config(&dir),
        http.clone(),
        Arc::new(HtmlDirectoryLister::new(http)),
        market.clone(),
    );
    let report = DownloadJob::parse("klines", "linear", "60")
        .unwrap()
        .run(&ctx)
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.no_data, 1);
    assert!(!dir.path().join("bybit_data/klines/linear/NEWUSDT").exists());
}
