//! Capabilities and fetchers
//!
//! Everything that talks to the network goes through one of three
//! capabilities, each an object-safe trait so runs can be wired to fakes:
//!
//! - [`HttpFetch`] - GET a URL, yielding the status and a streamed body
//! - [`DirectoryLister`] - list the child entries of a directory index page
//! - [`MarketDataClient`] - tickers, funding history and klines from the REST API
//!
//! On top of them sit the [`walker::DirectoryWalker`], the
//! [`archive::ArchiveFetcher`] and the window pager in [`pagination`].

use crate::{Category, FundingRate, Interval, Kline, Ticker};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

pub mod archive;
pub mod bybit_config;
pub mod bybit_http;
pub mod bybit_parser;
pub mod http;
pub mod listing;
pub mod pagination;
pub mod shared_resources;
pub mod walker;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code received
        status: u16,
    },

    /// Connection, timeout or body transfer failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// REST API returned a non-zero return code
    #[error("API error {code}: {message}")]
    ApiError {
        /// `retCode` of the envelope
        code: i64,
        /// `retMsg` of the envelope
        message: String,
    },

    /// Directory index could not be listed
    #[error("listing error: {0}")]
    ListingError(String),

    /// Compressed payload is corrupt or truncated
    #[error("decompression error: {0}")]
    DecompressionError(String),

    /// Local filesystem failure
    #[error("IO error: {0}")]
    IoError(String),

    /// Pagination did not converge
    #[error("pagination error: {0}")]
    PaginationError(String),

    /// URL cannot be mapped to a local path
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Shutdown was requested before the operation started
    #[error("cancelled")]
    Cancelled,
}

impl FetcherError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetcherError::NetworkError(_) => true,
            FetcherError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Streamed response body
pub type ByteStream = Pin<Box<dyn Stream<Item = FetcherResult<Bytes>> + Send>>;

/// Response of a GET request
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Body chunks in arrival order
    pub body: ByteStream,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Collect the whole body into memory
    pub async fn into_bytes(self) -> FetcherResult<Vec<u8>> {
        use futures_util::StreamExt;

        let mut body = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// GET with status and streamed body
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Issue a GET request.
    ///
    /// Returns `Ok` for every response that arrived, whatever its status;
    /// callers decide which statuses are fatal.
    async fn get(&self, url: &str) -> FetcherResult<HttpResponse>;
}

/// Lists the child entries of a remote directory
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Relative entry names found at `url`, in page order.
    ///
    /// Directory entries keep their trailing `/`.
    async fn list_entries(&self, url: &str) -> FetcherResult<Vec<String>>;
}

/// Funding rate history request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingHistoryRequest {
    /// Product category
    pub category: Category,
    /// Trading symbol
    pub symbol: String,
    /// Inclusive start (milliseconds)
    pub start_time: i64,
    /// Inclusive end (milliseconds)
    pub end_time: i64,
    /// Maximum rows, at most 200
    pub limit: usize,
}

/// Kline request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    /// Product category
    pub category: Category,
    /// Trading symbol
    pub symbol: String,
    /// Bar interval
    pub interval: Interval,
    /// Inclusive start (milliseconds)
    pub start: i64,
    /// Inclusive end (milliseconds)
    pub end: i64,
    /// Maximum rows, at most 1000
    pub limit: usize,
}

/// REST market-data capability
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// All tickers of a category
    async fn get_tickers(&self, category: Category) -> FetcherResult<Vec<Ticker>>;

    /// One page of funding rate history
    async fn get_funding_rate_history(
        &self,
        request: &FundingHistoryRequest,
    ) -> FetcherResult<Vec<FundingRate>>;

    /// One page of klines
    async fn get_kline(&self, request: &KlineRequest) -> FetcherResult<Vec<Kline>>;
}
