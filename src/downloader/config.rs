//! Download configuration constants and run configuration

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::batch::ErrorPolicy;

/// Static file server publishing the archive trees.
pub const ARCHIVE_BASE_URL: &str = "https://public.bybit.com";

/// Bybit v5 REST API.
pub const API_BASE_URL: &str = "https://api.bybit.com";

/// Directory inserted between the destination root and the mirrored tree.
pub const LOCAL_NAMESPACE: &str = "bybit_data";

/// Number of tasks run concurrently per batch.
/// 20 in-flight requests keeps the static file server busy without fanning out
/// thousands of connections on large trees.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Maximum number of retries for transient transfer failures.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Width of one funding-rate history window.
/// Funding settles at most every hour on some contracts, so 60 days can exceed
/// one page; the pager walks backwards inside the window when a page is full.
pub const FUNDING_WINDOW_DAYS: i64 = 60;

/// Maximum rows per funding-rate history request.
pub const FUNDING_PAGE_LIMIT: usize = 200;

/// Maximum rows per kline request.
pub const KLINE_PAGE_LIMIT: usize = 1000;

/// Calculate exponential backoff delay
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// First instant of history requested from the REST API.
pub fn default_history_start() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2018, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Settings shared by every job of a run
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Root directory receiving the local namespace
    pub destination_dir: PathBuf,
    /// Base URL of the static file server
    pub archive_base_url: String,
    /// Base URL of the REST API
    pub api_base_url: String,
    /// Tasks per batch
    pub batch_size: usize,
    /// What to do when a task of a batch fails
    pub error_policy: ErrorPolicy,
    /// Retries for transient transfer failures
    pub max_retries: u32,
    /// Start of API history
    pub history_start: DateTime<Utc>,
    /// End of API history, `None` meaning "now"
    pub history_end: Option<DateTime<Utc>>,
    /// Restrict API jobs to these symbols instead of the ticker list
    pub symbols: Option<Vec<String>>,
}

impl DownloaderConfig {
    /// Configuration with defaults for the given destination
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            archive_base_url: ARCHIVE_BASE_URL.to_string(),
            api_base_url: API_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            error_policy: ErrorPolicy::default(),
            max_retries: MAX_RETRIES,
            history_start: default_history_start(),
            history_end: None,
            symbols: None,
        }
    }

    /// Override the static file server
    pub fn with_archive_base_url(mut self, url: impl Into<String>) -> Self {
        self.archive_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the REST API base URL
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the batch size (zero is treated as one)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the error policy
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the transfer retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Bound API history
    pub fn with_history(mut self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        self.history_start = start;
        self.history_end = end;
        self
    }

    /// Restrict API jobs to explicit symbols
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = if symbols.is_empty() { None } else { Some(symbols) };
        self
    }

    /// End of the requested history, resolved against the clock
    pub fn history_end_or_now(&self) -> DateTime<Utc> {
        self.history_end.unwrap_or_else(Utc::now)
    }
}
