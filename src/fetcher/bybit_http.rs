//! reqwest-backed [`MarketDataClient`] for the Bybit v5 API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::downloader::config::{API_BASE_URL, MAX_RETRIES};
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::bybit_config::{BybitEndpoints, V5_MARKET};
use crate::fetcher::bybit_parser::BybitParser;
use crate::fetcher::http::send_with_retry;
use crate::fetcher::shared_resources::{api_http_client, api_rate_limiter};
use crate::fetcher::{
    FetcherError, FetcherResult, FundingHistoryRequest, KlineRequest, MarketDataClient,
};
use crate::{Category, FundingRate, Kline, Ticker};

/// Bybit v5 REST client
///
/// Every request goes through the shared rate limiter, then
/// [`send_with_retry`].
pub struct BybitRestClient {
    client: Arc<Client>,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
    endpoints: BybitEndpoints,
    max_retries: u32,
}

impl BybitRestClient {
    /// Client against `base_url` using the process-wide client and limiter
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_parts(api_http_client(), base_url, api_rate_limiter())
    }

    /// Client built from explicit parts
    pub fn with_parts(
        client: Arc<Client>,
        base_url: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            endpoints: V5_MARKET,
            max_retries: MAX_RETRIES,
        }
    }

    /// Set the retry budget for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_list(&self, endpoint: &str, params: &[(&str, String)]) -> FetcherResult<Vec<Value>> {
        let url = format!("{}{}", self.base_url, endpoint);

        self.rate_limiter
            .acquire()
            .await
            .map_err(|e| FetcherError::NetworkError(format!("Rate limiter error: {e}")))?;

        debug!("GET {} with {} params", url, params.len());
        let response = send_with_retry(&self.client, &url, params, self.max_retries, "api").await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetcherError::HttpStatus { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetcherError::NetworkError(format!("{url}: {e}")))?;
        BybitParser::parse_envelope(&body)
    }
}

impl Default for BybitRestClient {
    fn default() -> Self {
        Self::new(API_BASE_URL)
    }
}

#[async_trait]
impl MarketDataClient for BybitRestClient {
    async fn get_tickers(&self, category: Category) -> FetcherResult<Vec<Ticker>> {
        let params = [("category", category.as_str().to_string())];
        let list = self.get_list(self.endpoints.tickers, &params).await?;
        BybitParser::parse_tickers(list)
    }

    async fn get_funding_rate_history(
        &self,
        request: &FundingHistoryRequest,
    ) -> FetcherResult<Vec<FundingRate>> {
        let limit = request.limit.clamp(1, self.endpoints.funding_max_limit);
        let params = [
            ("category", request.category.as_str().to_string()),
            ("symbol", request.symbol.clone()),
            ("startTime", request.start_time.to_string()),
            ("endTime", request.end_time.to_string()),
            ("limit", limit.to_string()),
        ];
        let list = self.get_list(self.endpoints.funding_history, &params).await?;
        BybitParser::parse_funding_rates(list)
    }

    async fn get_kline(&self, request: &KlineRequest) -> FetcherResult<Vec<Kline>> {
        let limit = request.limit.clamp(1, self.endpoints.kline_max_limit);
        let params = [
            ("category", request.category.as_str().to_string()),
            ("symbol", request.symbol.clone()),
            ("interval", request.interval.as_str().to_string()),
            ("start", request.start.to_string()),
            ("end", request.end.to_string()),
            ("limit", limit.to_string()),
        ];
        let list = self.get_list(self.endpoints.kline, &params).await?;
        BybitParser::parse_klines(list)
    }
}
