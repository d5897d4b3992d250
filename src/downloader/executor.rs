//! Run context and per-job execution

use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::info;

use super::batch::{BatchReport, BatchScheduler, TaskOutcome};
use super::config::DownloaderConfig;
use super::job::DownloadJob;
use super::timeseries::TimeSeriesSync;
use super::DownloadResult;
use crate::fetcher::archive::{ArchiveFetcher, FetchOutcome};
use crate::fetcher::bybit_http::BybitRestClient;
use crate::fetcher::http::ReqwestHttpClient;
use crate::fetcher::listing::HtmlDirectoryLister;
use crate::fetcher::walker::DirectoryWalker;
use crate::fetcher::{DirectoryLister, HttpFetch, MarketDataClient};
use crate::output::PathResolver;
use crate::shutdown::SharedShutdown;
use crate::DataType;

/// Everything a job needs to run: configuration and injected capabilities
#[derive(Clone)]
pub struct RunContext {
    /// Run configuration
    pub config: DownloaderConfig,
    /// GET capability for archive files
    pub http: Arc<dyn HttpFetch>,
    /// Directory index capability
    pub lister: Arc<dyn DirectoryLister>,
    /// REST market data capability
    pub market: Arc<dyn MarketDataClient>,
    /// Cancellation signal
    pub shutdown: Option<SharedShutdown>,
    /// Run-level progress bar
    pub progress: Option<ProgressBar>,
}

impl RunContext {
    /// Context over explicit capabilities
    pub fn new(
        config: DownloaderConfig,
        http: Arc<dyn HttpFetch>,
        lister: Arc<dyn DirectoryLister>,
        market: Arc<dyn MarketDataClient>,
    ) -> Self {
        Self {
            config,
            http,
            lister,
            market,
            shutdown: None,
            progress: None,
        }
    }

    /// Context over the reqwest-backed production capabilities
    pub fn with_defaults(config: DownloaderConfig) -> Self {
        let http: Arc<dyn HttpFetch> =
            Arc::new(ReqwestHttpClient::new().with_max_retries(config.max_retries));
        let lister = Arc::new(HtmlDirectoryLister::new(http.clone()));
        let market = Arc::new(
            BybitRestClient::new(config.api_base_url.clone()).with_max_retries(config.max_retries),
        );
        Self::new(config, http, lister, market)
    }

    /// Attach a cancellation signal
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Attach a progress bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Resolver rooted at the destination directory
    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(&self.config.destination_dir)
    }

    fn walker(&self) -> DirectoryWalker {
        let walker = DirectoryWalker::new(self.lister.clone(), self.config.archive_base_url.clone())
            .with_concurrency(self.config.batch_size);
        match &self.shutdown {
            Some(shutdown) => walker.with_shutdown(shutdown.clone()),
            None => walker,
        }
    }

    fn timeseries(&self) -> TimeSeriesSync {
        TimeSeriesSync::new(self.market.clone(), &self.config)
            .with_shutdown(self.shutdown.clone())
            .with_progress(self.progress.clone())
    }
}

impl DownloadJob {
    /// Execute the job.
    ///
    /// Task failures are tallied in the report; only run-level failures
    /// (listing, ticker enumeration, fail-fast, cancellation) are returned as
    /// errors.
    pub async fn run(&self, ctx: &RunContext) -> DownloadResult<BatchReport> {
        info!("Starting {} into {}", self, ctx.config.destination_dir.display());

        let report = match *self {
            DownloadJob::ArchiveMirror { data_type } => mirror_archives(ctx, data_type).await?,
            DownloadJob::FundingRateSync => ctx.timeseries().sync_all_funding().await?,
            DownloadJob::KlineSync { category, interval } => {
                ctx.timeseries().sync_all_klines(category, interval).await?
            }
        };

        info!("Finished {}: {}", self, report);
        Ok(report)
    }

    /// Terminal archive URLs of an archive job, or `None` for API jobs
    pub async fn list_files(&self, ctx: &RunContext) -> DownloadResult<Option<Vec<String>>> {
        match *self {
            DownloadJob::ArchiveMirror { data_type } => {
                Ok(Some(ctx.walker().list_files(data_type).await?))
            }
            _ => Ok(None),
        }
    }
}

async fn mirror_archives(ctx: &RunContext, data_type: DataType) -> DownloadResult<BatchReport> {
    let urls = ctx.walker().list_files(data_type).await?;
    info!("Found {} {} files", urls.len(), data_type);

    if let Some(pb) = &ctx.progress {
        pb.set_length(urls.len() as u64);
    }

    let mut fetcher = ArchiveFetcher::new(ctx.http.clone(), ctx.resolver());
    if let Some(shutdown) = &ctx.shutdown {
        fetcher = fetcher.with_shutdown(shutdown.clone());
    }
    let fetcher = &fetcher;

    BatchScheduler::new(ctx.config.batch_size, "archive")
        .with_policy(ctx.config.error_policy)
        .with_shutdown(ctx.shutdown.clone())
        .with_progress(ctx.progress.clone())
        .run_batches(urls, move |url: String| async move {
            fetcher.fetch(&url).await.map(|outcome| match outcome {
                FetchOutcome::Downloaded { .. } => TaskOutcome::Completed,
                FetchOutcome::Skipped { .. } => TaskOutcome::Skipped,
            })
        })
        .await
}
