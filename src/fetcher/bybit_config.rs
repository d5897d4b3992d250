//! Bybit v5 REST endpoints and page limits
//!
//! All categories (linear, inverse, spot) share the same endpoints; the
//! category is a query parameter.

use crate::downloader::config::{FUNDING_PAGE_LIMIT, KLINE_PAGE_LIMIT};

/// Endpoint paths and limits of the v5 market API
#[derive(Debug, Clone)]
pub struct BybitEndpoints {
    /// Ticker list (`category`)
    pub tickers: &'static str,
    /// Funding rate history (`category`, `symbol`, `startTime`, `endTime`, `limit`)
    pub funding_history: &'static str,
    /// Klines (`category`, `symbol`, `interval`, `start`, `end`, `limit`)
    pub kline: &'static str,
    /// Maximum `limit` of the funding history endpoint
    pub funding_max_limit: usize,
    /// Maximum `limit` of the kline endpoint
    pub kline_max_limit: usize,
}

/// Bybit v5 market endpoints
pub const V5_MARKET: BybitEndpoints = BybitEndpoints {
    tickers: "/v5/market/tickers",
    funding_history: "/v5/market/funding/history",
    kline: "/v5/market/kline",
    funding_max_limit: FUNDING_PAGE_LIMIT,
    kline_max_limit: KLINE_PAGE_LIMIT,
};

/// `retCode` of a successful response
pub const RET_CODE_OK: i64 = 0;
