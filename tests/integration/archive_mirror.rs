//! Archive mirroring through the walker, the scheduler and the fetcher

use std::sync::Arc;

use bybit_bulk_downloader::downloader::{
    DownloadError, DownloadJob, DownloaderConfig, ErrorPolicy, RunContext,
};
use bybit_bulk_downloader::fetcher::listing::HtmlDirectoryLister;
use bybit_bulk_downloader::fetcher::FetcherError;
use bybit_bulk_downloader::shutdown::ShutdownCoordinator;
use bybit_bulk_downloader::DataType;
use tempfile::TempDir;

use crate::common::{gzip, index_page, FakeHttp, FakeMarketData, ARCHIVE_BASE};

fn context(dir: &TempDir, http: &Arc<FakeHttp>, batch_size: usize) -> RunContext {
    let config = DownloaderConfig::new(dir.path())
        .with_archive_base_url(ARCHIVE_BASE)
        .with_batch_size(batch_size);
    RunContext::new(
        config,
        http.clone(),
        Arc::new(HtmlDirectoryLister::new(http.clone())),
        FakeMarketData::new(),
    )
}

/// Publish `files` for one symbol of the `trading` tree
fn publish_trading(http: &FakeHttp, symbol: &str, files: &[String]) {
    http.route(
        format!("{ARCHIVE_BASE}/trading/"),
        200,
        index_page(&[&format!("{symbol}/")]),
    );
    let names: Vec<&str> = files.iter().map(String::as_str).collect();
    http.route(
        format!("{ARCHIVE_BASE}/trading/{symbol}/"),
        200,
        index_page(&names),
    );
}

#[tokio::test]
async fn test_trading_mirror_and_rerun() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    publish_trading(&http, "BTCUSDT", &["BTCUSDT2020-01-01.csv.gz".to_string()]);
    http.route(
        format!("{ARCHIVE_BASE}/trading/BTCUSDT/BTCUSDT2020-01-01.csv.gz"),
        200,
        gzip(b"a,b\n1,2\n"),
    );

    let ctx = context(&dir, &http, 20);
    let job = DownloadJob::parse("trading", "linear", "1").unwrap();

    let report = job.run(&ctx).await.unwrap();
    assert_eq!(report.completed, 1);
    assert!(report.is_success());

    let symbol_dir = dir.path().join("bybit_data/trading/BTCUSDT");
    let target = symbol_dir.join("BTCUSDT2020-01-01.csv");
    assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");
    let leftovers: Vec<_> = std::fs::read_dir(&symbol_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "only the csv may remain: {leftovers:?}");

    // Second run: listing only, no archive request, nothing changes
    let archive_calls = http.archive_calls();
    let report = job.run(&ctx).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.completed, 0);
    assert_eq!(http.archive_calls(), archive_calls);
    assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");
}

#[tokio::test]
async fn test_metatrader_keeps_year_level() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    let root = format!("{ARCHIVE_BASE}/kline_for_metatrader4/");
    http.route(&root, 200, index_page(&["BTCUSDT/"]));
    http.route(format!("{root}BTCUSDT/"), 200, index_page(&["2021/", "2022/"]));
    http.route(
        format!("{root}BTCUSDT/2021/"),
        200,
        index_page(&["BTCUSDT_15_2021-12-01_2021-12-31.csv.gz"]),
    );
    http.route(
        format!("{root}BTCUSDT/2022/"),
        200,
        index_page(&["BTCUSDT_15_2022-01-01_2022-01-31.csv.gz"]),
    );
    http.route(
        format!("{root}BTCUSDT/2021/BTCUSDT_15_2021-12-01_2021-12-31.csv.gz"),
        200,
        gzip(b"2021"),
    );
    http.route(
        format!("{root}BTCUSDT/2022/BTCUSDT_15_2022-01-01_2022-01-31.csv.gz"),
        200,
        gzip(b"2022"),
    );

    let ctx = context(&dir, &http, 20);
    let report = DownloadJob::ArchiveMirror {
        data_type: DataType::KlineForMetatrader4,
    }
    .run(&ctx)
    .await
    .unwrap();
    assert_eq!(report.completed, 2);

    let base = dir.path().join("bybit_data/kline_for_metatrader4/BTCUSDT");
    assert_eq!(
        std::fs::read(base.join("2021/BTCUSDT_15_2021-12-01_2021-12-31.csv")).unwrap(),
        b"2021"
    );
    assert_eq!(
        std::fs::read(base.join("2022/BTCUSDT_15_2022-01-01_2022-01-31.csv")).unwrap(),
        b"2022"
    );
}

#[tokio::test]
async fn test_one_missing_file_in_a_batch_of_twenty() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    let files: Vec<String> = (1..=20).map(|day| format!("SOLUSDT2024-01-{day:02}.csv.gz")).collect();
    publish_trading(&http, "SOLUSDT", &files);
    for file in files.iter().filter(|f| !f.contains("-07.")) {
        http.route(
            format!("{ARCHIVE_BASE}/trading/SOLUSDT/{file}"),
            200,
            gzip(file.as_bytes()),
        );
    }

    let ctx = context(&dir, &http, 20);
    let report = DownloadJob::parse("trading", "linear", "1")
        .unwrap()
        .run(&ctx)
        .await
        .unwrap();

    assert_eq!(report.completed, 19);
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].item.ends_with("SOLUSDT2024-01-07.csv.gz"));
    assert!(report.failures[0].error.contains("404"));

    let written = std::fs::read_dir(dir.path().join("bybit_data/trading/SOLUSDT"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(written.len(), 19);
    assert!(written.iter().all(|name| name.ends_with(".csv")));
}

#[tokio::test]
async fn test_fail_fast_stops_after_failing_batch() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    let files: Vec<String> = (1..=10).map(|day| format!("XRPUSDT2024-02-{day:02}.csv.gz")).collect();
    publish_trading(&http, "XRPUSDT", &files);
    for file in files.iter().skip(1) {
        http.route(
            format!("{ARCHIVE_BASE}/trading/XRPUSDT/{file}"),
            200,
            gzip(b"x"),
        );
    }

    let mut ctx = context(&dir, &http, 5);
    ctx.config = ctx.config.clone().with_error_policy(ErrorPolicy::FailFast);

    let err = DownloadJob::parse("trading", "linear", "1")
        .unwrap()
        .run(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::BatchFailed { failed: 1, .. }));

    // Only the first batch of five was attempted
    assert_eq!(http.archive_calls(), 5);
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    http.route(format!("{ARCHIVE_BASE}/spot/"), 500, Vec::new());

    let err = DownloadJob::parse("spot", "linear", "1")
        .unwrap()
        .run(&context(&dir, &http, 20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::FetcherError(FetcherError::ListingError(_))
    ));
    assert!(!dir.path().join("bybit_data/spot").exists());
}

#[tokio::test]
async fn test_shutdown_before_run_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let http = FakeHttp::new();
    publish_trading(&http, "BTCUSDT", &["BTCUSDT2020-01-01.csv.gz".to_string()]);

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let ctx = context(&dir, &http, 20).with_shutdown(shutdown);

    let err = DownloadJob::parse("trading", "linear", "1")
        .unwrap()
        .run(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Cancelled | DownloadError::FetcherError(FetcherError::Cancelled)
    ));
    assert!(http.calls().is_empty());
}
