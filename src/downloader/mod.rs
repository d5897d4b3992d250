//! Download orchestration
//!
//! A run is described by a [`DownloadJob`] and executed against a
//! [`RunContext`] holding the configuration and the injected capabilities:
//!
//! ```no_run
//! use bybit_bulk_downloader::downloader::{DownloadJob, DownloaderConfig, RunContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = DownloadJob::parse("klines", "linear", "60")?;
//! let config = DownloaderConfig::new("./data").with_symbols(vec!["BTCUSDT".into()]);
//! let report = job.run(&RunContext::with_defaults(config)).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`job`] - the closed set of jobs and their parsing
//! - [`executor`] - the run context and per-job execution
//! - [`batch`] - bounded-concurrency batch scheduling
//! - [`timeseries`] - windowed REST pagination and merging
//! - [`rate_limit`] - REST request budget
//! - [`config`] - constants, backoff and run configuration

pub mod batch;
pub mod config;
pub mod executor;
pub mod job;
pub mod rate_limit;
pub mod timeseries;

pub use batch::{BatchReport, BatchScheduler, ErrorPolicy, TaskOutcome};
pub use config::DownloaderConfig;
pub use executor::RunContext;
pub use job::DownloadJob;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use timeseries::TimeSeriesSync;

use crate::fetcher::FetcherError;
use crate::output::OutputError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Invalid run request, raised before any I/O
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// A batch had failures under the fail-fast policy
    #[error("{failed} task(s) failed: {details}")]
    BatchFailed {
        /// Failures in the aborted batch
        failed: usize,
        /// Rendered failures so far
        details: String,
    },

    /// Some pieces of a series failed; completed pieces were kept
    #[error("incomplete: {0}")]
    Incomplete(String),

    /// Shutdown was requested
    #[error("cancelled")]
    Cancelled,
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;
