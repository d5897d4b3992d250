//! Directory index parsing and walking over an HTTP capability

use std::sync::Arc;

use bybit_bulk_downloader::fetcher::listing::{parse_entries, HtmlDirectoryLister};
use bybit_bulk_downloader::fetcher::walker::DirectoryWalker;
use bybit_bulk_downloader::DataType;

use crate::common::{index_page, FakeHttp, ARCHIVE_BASE};

#[test]
fn test_parse_autoindex_page() {
    let html = r#"<html>
<head><title>Index of /trading/BTCUSDT/</title></head>
<body>
<h1>Index of /trading/BTCUSDT/</h1><hr><pre><a href="../">../</a>
<a href="BTCUSDT2019-10-01.csv.gz">BTCUSDT2019-10-01.csv.gz</a>     02-Oct-2019 02:00    1285739
<a href="BTCUSDT2019-10-02.csv.gz">BTCUSDT2019-10-02.csv.gz</a>     03-Oct-2019 02:00    1420017
<a href='?C=M;O=A'>Last modified</a>
<a href="https://www.bybit.com/">Bybit</a>
</pre><hr></body>
</html>"#;

    let entries = parse_entries(html, "https://public.bybit.com/trading/BTCUSDT/");
    assert_eq!(
        entries,
        vec!["BTCUSDT2019-10-01.csv.gz", "BTCUSDT2019-10-02.csv.gz"]
    );
}

#[tokio::test]
async fn test_walker_flattens_symbol_directories() {
    let http = FakeHttp::new();
    http.route(
        format!("{ARCHIVE_BASE}/spot_index/"),
        200,
        index_page(&["BTCUSDT/", "ETHUSDT/", "README.txt"]),
    );
    http.route(
        format!("{ARCHIVE_BASE}/spot_index/BTCUSDT/"),
        200,
        index_page(&["BTCUSDT2024-01-01_index_price.csv.gz", "notes.md"]),
    );
    http.route(
        format!("{ARCHIVE_BASE}/spot_index/ETHUSDT/"),
        200,
        index_page(&["ETHUSDT2024-01-01_index_price.csv.gz"]),
    );

    let walker = DirectoryWalker::new(Arc::new(HtmlDirectoryLister::new(http.clone())), ARCHIVE_BASE);
    let files = walker.list_files(DataType::SpotIndex).await.unwrap();

    assert_eq!(
        files,
        vec![
            format!("{ARCHIVE_BASE}/spot_index/BTCUSDT/BTCUSDT2024-01-01_index_price.csv.gz"),
            format!("{ARCHIVE_BASE}/spot_index/ETHUSDT/ETHUSDT2024-01-01_index_price.csv.gz"),
        ]
    );
    assert_eq!(http.archive_calls(), 0);
}
