//! Recursive discovery of downloadable archive URLs

use futures_util::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::downloader::config::DEFAULT_BATCH_SIZE;
use crate::fetcher::{DirectoryLister, FetcherError, FetcherResult};
use crate::shutdown::{self, SharedShutdown};
use crate::DataType;

/// Suffix of downloadable archive files
pub const ARCHIVE_SUFFIX: &str = ".gz";

/// Walks the static file server tree of one data type.
///
/// The tree is `{base}/{data_type}/{symbol}/{file}` or, for data types with a
/// year level, `{base}/{data_type}/{symbol}/{year}/{file}`.
pub struct DirectoryWalker {
    lister: Arc<dyn DirectoryLister>,
    base_url: String,
    concurrency: usize,
    shutdown: Option<SharedShutdown>,
}

impl DirectoryWalker {
    /// Walker listing pages below `base_url`
    pub fn new(lister: Arc<dyn DirectoryLister>, base_url: impl Into<String>) -> Self {
        Self {
            lister,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            concurrency: DEFAULT_BATCH_SIZE,
            shutdown: None,
        }
    }

    /// Maximum listing pages fetched at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop listing once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Root listing URL of a data type
    pub fn root_url(&self, data_type: DataType) -> String {
        format!("{}/{}/", self.base_url, data_type.as_str())
    }

    /// Every terminal archive URL of `data_type`, in listing order.
    ///
    /// The whole set is materialized before returning. Any listing failure
    /// aborts the walk.
    pub async fn list_files(&self, data_type: DataType) -> FetcherResult<Vec<String>> {
        let root = self.root_url(data_type);
        info!("Listing {}", root);

        let symbols: Vec<String> = self
            .list(&root)
            .await?
            .into_iter()
            .filter(|entry| {
                let is_dir = entry.ends_with('/');
                if !is_dir {
                    debug!("Skipping non-directory entry {} at {}", entry, root);
                }
                is_dir
            })
            .collect();

        let leaf_dirs = if data_type.has_year_level() {
            let per_symbol: Vec<Vec<String>> = stream::iter(symbols)
                .map(|symbol| {
                    let url = format!("{root}{symbol}");
                    async move {
                        let years = self.list(&url).await?;
                        Ok::<_, FetcherError>(
                            years
                                .into_iter()
                                .filter(|year| year.ends_with('/'))
                                .map(|year| format!("{symbol}{year}"))
                                .collect::<Vec<_>>(),
                        )
                    }
                })
                .buffered(self.concurrency)
                .try_collect()
                .await?;
            per_symbol.into_iter().flatten().collect()
        } else {
            symbols
        };

        debug!("{} directories to list under {}", leaf_dirs.len(), root);

        let per_dir: Vec<Vec<String>> = stream::iter(leaf_dirs)
            .map(|dir| {
                let url = format!("{root}{dir}");
                async move {
                    let files = self.list(&url).await?;
                    Ok::<_, FetcherError>(
                        files
                            .into_iter()
                            .filter(|file| {
                                let keep = !file.ends_with('/') && file.ends_with(ARCHIVE_SUFFIX);
                                if !keep {
                                    debug!("Skipping entry {} at {}", file, url);
                                }
                                keep
                            })
                            .map(|file| format!("{url}{file}"))
                            .collect::<Vec<_>>(),
                    )
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let files: Vec<String> = per_dir.into_iter().flatten().collect();
        info!("Found {} files for {}", files.len(), data_type);
        Ok(files)
    }

    async fn list(&self, url: &str) -> FetcherResult<Vec<String>> {
        if shutdown::is_requested(self.shutdown.as_ref()) {
            return Err(FetcherError::Cancelled);
        }

        match self.lister.list_entries(url).await {
            Ok(entries) => Ok(entries),
            Err(e @ (FetcherError::ListingError(_) | FetcherError::Cancelled)) => Err(e),
            Err(e) => Err(FetcherError::ListingError(format!("{url}: {e}"))),
        }
    }
}
