//! Process-wide HTTP clients and the REST rate limiter
//!
//! Every fetcher shares these instances so connection pools are reused and the
//! REST budget is enforced per process, not per job.

use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;

use crate::downloader::rate_limit::RateLimiter;

/// Time to establish a TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Longest silence tolerated while an archive body streams in
const ARCHIVE_READ_TIMEOUT_SECS: u64 = 60;
/// Whole-request timeout for REST calls
const API_REQUEST_TIMEOUT_SECS: u64 = 30;

/// REST requests allowed per window
pub const API_RATE_LIMIT_REQUESTS: usize = 120;
/// REST rate limit window
pub const API_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5);

fn finish(builder: ClientBuilder) -> Client {
    builder.build().unwrap_or_else(|e| {
        panic!("FATAL: Failed to build HTTP client: {e}. Check system TLS configuration.");
    })
}

/// Client for large archive bodies.
///
/// Only stalls are bounded: a slow link may take as long as it needs as long
/// as bytes keep arriving within `read_timeout`.
pub(crate) fn build_archive_client(read_timeout: Duration) -> Client {
    finish(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .read_timeout(read_timeout),
    )
}

fn build_api_client() -> Client {
    finish(
        Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(API_REQUEST_TIMEOUT_SECS)),
    )
}

static ARCHIVE_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(build_archive_client(Duration::from_secs(
        ARCHIVE_READ_TIMEOUT_SECS,
    )))
});

static API_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| Arc::new(build_api_client()));

static API_RATE_LIMITER: Lazy<Arc<RateLimiter>> = Lazy::new(|| {
    Arc::new(RateLimiter::request_based(
        API_RATE_LIMIT_REQUESTS,
        API_RATE_LIMIT_WINDOW,
    ))
});

/// Client used for listings and archive downloads
pub fn archive_http_client() -> Arc<Client> {
    ARCHIVE_HTTP_CLIENT.clone()
}

/// Client used for REST calls
pub fn api_http_client() -> Arc<Client> {
    API_HTTP_CLIENT.clone()
}

/// Rate limiter shared by every REST call of the process
pub fn api_rate_limiter() -> Arc<RateLimiter> {
    API_RATE_LIMITER.clone()
}
