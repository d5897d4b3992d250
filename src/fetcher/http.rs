//! reqwest-backed [`HttpFetch`] with bounded retries

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::downloader::config::{calculate_backoff, MAX_RETRIES};
use crate::fetcher::shared_resources::archive_http_client;
use crate::fetcher::{FetcherError, FetcherResult, HttpFetch, HttpResponse};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Send a GET, retrying transient failures with exponential backoff.
///
/// Retries on:
/// - network errors (connect, timeout)
/// - 429 and 5xx responses
///
/// Any other response is returned as is, whatever its status. When the
/// retries are exhausted on a retryable status the last response is returned
/// so the caller sees the real status.
pub async fn send_with_retry(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    max_retries: u32,
    target: &'static str,
) -> FetcherResult<reqwest::Response> {
    let mut attempt = 0;

    loop {
        let metrics = HttpRequestMetrics::start(target, attempt);

        match client.get(url).query(query).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                metrics.record_complete(status);

                if !is_retryable_status(status) || attempt >= max_retries {
                    return Ok(response);
                }

                warn!(
                    "HTTP {} from {} on attempt {}/{}",
                    status,
                    url,
                    attempt + 1,
                    max_retries + 1
                );
            }
            Err(e) => {
                metrics.record_network_error(&e.to_string());

                if attempt >= max_retries {
                    return Err(FetcherError::NetworkError(format!("{url}: {e}")));
                }

                warn!(
                    "Network error for {} on attempt {}/{}: {}",
                    url,
                    attempt + 1,
                    max_retries + 1,
                    e
                );
            }
        }

        let backoff = calculate_backoff(attempt);
        record_retry_backoff(backoff, attempt + 1);
        debug!("Retrying {} after {:?}", url, backoff);
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Production [`HttpFetch`] for the static file server
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<Client>,
    max_retries: u32,
}

impl ReqwestHttpClient {
    /// Client sharing the process-wide archive connection pool
    pub fn new() -> Self {
        Self::with_client(archive_http_client())
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Arc<Client>) -> Self {
        Self {
            client,
            max_retries: MAX_RETRIES,
        }
    }

    /// Set the retry budget for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpFetch for ReqwestHttpClient {
    async fn get(&self, url: &str) -> FetcherResult<HttpResponse> {
        let response = send_with_retry(&self.client, url, &[], self.max_retries, "archive").await?;
        let status = response.status().as_u16();

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetcherError::NetworkError(e.to_string())));

        Ok(HttpResponse {
            status,
            body: Box::pin(body),
        })
    }
}
