//! CLI error types and conversions

use crate::downloader::DownloadError;
use crate::fetcher::FetcherError;
use crate::resume::lock::LockError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Destination lock error
    #[error("lock error: {0}")]
    LockError(#[from] LockError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The run finished but some tasks failed
    #[error("{failed} of {total} task(s) failed")]
    TasksFailed {
        /// Failed tasks
        failed: usize,
        /// Tasks accounted for
        total: usize,
    },
}
