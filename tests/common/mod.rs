//! Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bybit_bulk_downloader::fetcher::{
    FetcherError, FetcherResult, FundingHistoryRequest, HttpFetch, HttpResponse, KlineRequest,
    MarketDataClient,
};
use bybit_bulk_downloader::{Category, FundingRate, Interval, Kline, Ticker};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ARCHIVE_BASE: &str = "http://archive.test";

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Minimal autoindex page linking to `entries`
pub fn index_page(entries: &[&str]) -> Vec<u8> {
    let mut html = String::from("<html><body><pre><a href=\"../\">../</a>\n");
    for entry in entries {
        html.push_str(&format!("<a href=\"{entry}\">{entry}</a>   01-Jan-2024 00:00   1234\n"));
    }
    html.push_str("</pre></body></html>");
    html.into_bytes()
}

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// URL-keyed [`HttpFetch`]; unknown URLs answer 404
#[derive(Default)]
pub struct FakeHttp {
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: impl Into<String>, status: u16, body: Vec<u8>) {
        self.routes.lock().unwrap().insert(url.into(), (status, body));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests for archive files, listing pages excluded
    pub fn archive_calls(&self) -> usize {
        self.calls().iter().filter(|url| url.ends_with(".gz")).count()
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn get(&self, url: &str) -> FetcherResult<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or((404, b"not found".to_vec()));

        let chunks: Vec<FetcherResult<Bytes>> = body
            .chunks(64)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(HttpResponse {
            status,
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

/// In-memory REST API answering like Bybit: rows inside the requested
/// range, newest first, truncated to the limit.
#[derive(Default)]
pub struct FakeMarketData {
    tickers: Mutex<HashMap<Category, Vec<String>>>,
    funding: Mutex<HashMap<String, Vec<FundingRate>>>,
    klines: Mutex<HashMap<(Category, String), Vec<Kline>>>,
    /// Kline requests covering one of these instants fail once
    kline_failures: Mutex<Vec<i64>>,
    pub ticker_calls: AtomicUsize,
    pub funding_calls: AtomicUsize,
    pub kline_calls: AtomicUsize,
    funding_symbols: Mutex<Vec<String>>,
}

impl FakeMarketData {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_tickers(&self, category: Category, symbols: &[&str]) {
        self.tickers
            .lock()
            .unwrap()
            .insert(category, symbols.iter().map(|s| s.to_string()).collect());
    }

    pub fn with_funding(&self, symbol: &str, rows: Vec<FundingRate>) {
        self.funding.lock().unwrap().insert(symbol.to_string(), rows);
    }

    pub fn with_klines(&self, category: Category, symbol: &str, rows: Vec<Kline>) {
        self.klines
            .lock()
            .unwrap()
            .insert((category, symbol.to_string()), rows);
    }

    pub fn fail_kline_once_at(&self, at: DateTime<Utc>) {
        self.kline_failures.lock().unwrap().push(at.timestamp_millis());
    }

    pub fn funding_symbols(&self) -> Vec<String> {
        self.funding_symbols.lock().unwrap().clone()
    }

    fn page<T: Clone>(rows: &[T], ts: impl Fn(&T) -> i64, start: i64, end: i64, limit: usize) -> Vec<T> {
        let mut page: Vec<T> = rows
            .iter()
            .filter(|row| (start..=end).contains(&ts(row)))
            .cloned()
            .collect();
        page.sort_by_key(|row| std::cmp::Reverse(ts(row)));
        page.truncate(limit);
        page
    }
}

#[async_trait]
impl MarketDataClient for FakeMarketData {
    async fn get_tickers(&self, category: Category) -> FetcherResult<Vec<Ticker>> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tickers
            .lock()
            .unwrap()
            .get(&category)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|symbol| Ticker { symbol })
            .collect())
    }

    async fn get_funding_rate_history(
        &self,
        request: &FundingHistoryRequest,
    ) -> FetcherResult<Vec<FundingRate>> {
        self.funding_calls.fetch_add(1, Ordering::SeqCst);
        self.funding_symbols
            .lock()
            .unwrap()
            .push(request.symbol.clone());

        let funding = self.funding.lock().unwrap();
        let rows = funding.get(&request.symbol).cloned().unwrap_or_default();
        Ok(Self::page(
            &rows,
            |r| r.funding_rate_timestamp.timestamp_millis(),
            request.start_time,
            request.end_time,
            request.limit,
        ))
    }

    async fn get_kline(&self, request: &KlineRequest) -> FetcherResult<Vec<Kline>> {
        self.kline_calls.fetch_add(1, Ordering::SeqCst);

        let rows = self
            .klines
            .lock()
            .unwrap()
            .get(&(request.category, request.symbol.clone()))
            .cloned()
            .unwrap_or_default();

        if request.interval == Interval::OneMonth {
            // One bar at the oldest instant is enough to anchor the walk.
            return Ok(rows
                .iter()
                .map(|k| k.start_time)
                .min()
                .filter(|first| first.timestamp_millis() <= request.end)
                .map(|first| vec![kline(first, 0)])
                .unwrap_or_default());
        }

        {
            let mut failures = self.kline_failures.lock().unwrap();
            if let Some(pos) = failures
                .iter()
                .position(|at| (request.start..=request.end).contains(at))
            {
                failures.remove(pos);
                return Err(FetcherError::HttpStatus {
                    url: format!("kline {} {}", request.symbol, request.start),
                    status: 502,
                });
            }
        }

        Ok(Self::page(
            &rows,
            |k| k.start_time.timestamp_millis(),
            request.start,
            request.end,
            request.limit,
        ))
    }
}

pub fn funding(symbol: &str, at: DateTime<Utc>, rate: &str) -> FundingRate {
    FundingRate {
        symbol: symbol.to_string(),
        funding_rate: rate.parse().unwrap(),
        funding_rate_timestamp: at,
    }
}

pub fn kline(at: DateTime<Utc>, close: i64) -> Kline {
    let close = Decimal::from(close);
    Kline {
        start_time: at,
        open_price: close,
        high_price: close,
        low_price: close,
        close_price: close,
        volume: Decimal::ONE,
        turnover: close,
    }
}

/// One row every `step` from `start` (inclusive) to `end` (exclusive)
pub fn series<T>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: chrono::Duration,
    make: impl Fn(DateTime<Utc>, i64) -> T,
) -> Vec<T> {
    let mut rows = Vec::new();
    let mut at = start;
    let mut i = 0;
    while at < end {
        rows.push(make(at, i));
        at += step;
        i += 1;
    }
    rows
}
