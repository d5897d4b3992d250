//! End to end over real HTTP with the reqwest-backed capabilities

use bybit_bulk_downloader::downloader::{DownloadJob, DownloaderConfig, RunContext};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{gzip, index_page, ts};

async fn mount_page(server: &MockServer, at: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_archive_mirror_over_http_with_retry() {
    let server = MockServer::start().await;
    mount_page(&server, "/premium_index/", index_page(&["ETHUSDT/"])).await;
    mount_page(
        &server,
        "/premium_index/ETHUSDT/",
        index_page(&["ETHUSDT2024-01-01_premium_index.csv.gz"]),
    )
    .await;

    let file_path = "/premium_index/ETHUSDT/ETHUSDT2024-01-01_premium_index.csv.gz";
    // First attempt hits a transient failure
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, file_path, gzip(b"timestamp,open\n1704067200,1.0\n")).await;

    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig::new(dir.path())
        .with_archive_base_url(server.uri())
        .with_max_retries(1);
    let report = DownloadJob::parse("premium_index", "linear", "1")
        .unwrap()
        .run(&RunContext::with_defaults(config))
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(
        std::fs::read_to_string(
            dir.path()
                .join("bybit_data/premium_index/ETHUSDT/ETHUSDT2024-01-01_premium_index.csv")
        )
        .unwrap(),
        "timestamp,open\n1704067200,1.0\n"
    );
}

#[tokio::test]
async fn test_funding_sync_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .and(query_param("category", "linear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {"category": "linear", "list": [
                {"symbol": "BTCUSDT", "lastPrice": "42000"},
                {"symbol": "BTCPERP", "lastPrice": "42001"}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/market/funding/history"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {"category": "linear", "list": [
                {"symbol": "BTCUSDT", "fundingRate": "0.0001", "fundingRateTimestamp": "1704096000000"},
                {"symbol": "BTCUSDT", "fundingRate": "0.00015", "fundingRateTimestamp": "1704067200000"},
                {"symbol": "BTCUSDT", "fundingRate": "0.0001", "fundingRateTimestamp": "1704096000000"}
            ]}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig::new(dir.path())
        .with_api_base_url(server.uri())
        .with_history(ts(2024, 1, 1), Some(ts(2024, 1, 2)));
    let report = DownloadJob::FundingRateSync
        .run(&RunContext::with_defaults(config))
        .await
        .unwrap();
    assert_eq!(report.completed, 1);

    let content =
        std::fs::read_to_string(dir.path().join("bybit_data/fundingRate/BTCUSDT.csv")).unwrap();
    assert_eq!(
        content,
        ",symbol,fundingRate,fundingRateTimestamp\n\
         0,BTCUSDT,0.00015,2024-01-01 00:00:00\n\
         1,BTCUSDT,0.0001,2024-01-01 08:00:00\n"
    );
}

#[tokio::test]
async fn test_api_error_fails_the_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/funding/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": 10001,
            "retMsg": "params error: symbol invalid",
            "result": {}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig::new(dir.path())
        .with_api_base_url(server.uri())
        .with_symbols(vec!["NOPEUSDT".to_string()])
        .with_history(ts(2024, 1, 1), Some(ts(2024, 1, 2)));
    let report = DownloadJob::FundingRateSync
        .run(&RunContext::with_defaults(config))
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(report.failures[0].error.contains("10001"));
    assert!(!dir.path().join("bybit_data/fundingRate/NOPEUSDT.csv").exists());
}
