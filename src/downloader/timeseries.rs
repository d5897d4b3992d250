//! Funding rate and kline synchronization from the REST API
//!
//! Both series are fetched window by window and end up as one merged CSV per
//! symbol, sorted by time with one row per timestamp.
//!
//! Funding rates are small: all 60-day windows of a symbol are paged in
//! sequence, pooled in memory and written once.
//!
//! Klines are large: each window of `1000 x interval` is paged on its own,
//! persisted as an intermediate CSV under `{interval}_parts/`, and the
//! windows of a symbol run through the [`BatchScheduler`]. Once every window
//! is on disk the intermediates are merged into the final file and removed.
//! If any window failed the intermediates stay, so the next run only fetches
//! what is missing.

use chrono::{DateTime, Duration, Utc};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::batch::{BatchReport, BatchScheduler, TaskOutcome};
use super::config::{DownloaderConfig, FUNDING_PAGE_LIMIT, FUNDING_WINDOW_DAYS, KLINE_PAGE_LIMIT};
use super::{DownloadError, DownloadResult};
use crate::fetcher::pagination::{generate_windows, paginate_window, TimeWindow};
use crate::fetcher::{FundingHistoryRequest, KlineRequest, MarketDataClient};
use crate::output::csv::{read_kline_part, CsvFundingWriter, CsvKlineWriter, CsvLayout};
use crate::output::{merge_rows, FundingWriter, KlineWriter, OutputError, OutputWriter, PathResolver};
use crate::resume::is_complete;
use crate::shutdown::{self, SharedShutdown};
use crate::{Category, Interval, Kline};

/// Synchronizes API time series into the local layout
pub struct TimeSeriesSync {
    market: Arc<dyn MarketDataClient>,
    resolver: PathResolver,
    config: DownloaderConfig,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl TimeSeriesSync {
    /// Sync driven by `config`, fetching through `market`
    pub fn new(market: Arc<dyn MarketDataClient>, config: &DownloaderConfig) -> Self {
        Self {
            market,
            resolver: PathResolver::new(&config.destination_dir),
            config: config.clone(),
            shutdown: None,
            progress: None,
        }
    }

    /// Stop between requests once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Advance `progress` once per symbol
    pub fn with_progress(mut self, progress: Option<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    fn symbol_scheduler(&self, job_type: &'static str, symbols: usize) -> BatchScheduler {
        if let Some(pb) = &self.progress {
            pb.set_length(symbols as u64);
        }
        // Symbols run one at a time; concurrency lives inside a symbol.
        BatchScheduler::new(1, job_type)
            .with_policy(self.config.error_policy)
            .with_shutdown(self.shutdown.clone())
            .with_progress(self.progress.clone())
    }

    /// Sync the funding history of every USDT-quoted linear symbol, or of the
    /// configured symbols.
    pub async fn sync_all_funding(&self) -> DownloadResult<BatchReport> {
        let symbols = match &self.config.symbols {
            Some(symbols) => symbols.clone(),
            None => self
                .market
                .get_tickers(Category::Linear)
                .await?
                .into_iter()
                .filter(|t| t.is_usdt_quoted())
                .map(|t| t.symbol)
                .collect(),
        };
        info!("Syncing funding rates for {} symbols", symbols.len());

        let report = self
            .symbol_scheduler("funding_rate", symbols.len())
            .run_batches(symbols, |symbol: String| async move {
                self.sync_funding(&symbol).await
            })
            .await?;

        info!("Funding rate sync finished: {}", report);
        Ok(report)
    }

    /// Sync the funding history of one symbol
    pub async fn sync_funding(&self, symbol: &str) -> DownloadResult<TaskOutcome> {
        let target = self.resolver.resolve_funding(symbol);
        if is_complete(&target) {
            debug!("Skipping funding for {}, {} exists", symbol, target.display());
            return Ok(TaskOutcome::Skipped);
        }

        let windows = generate_windows(
            self.config.history_start,
            self.config.history_end_or_now(),
            Duration::days(FUNDING_WINDOW_DAYS),
        );
        debug!("Fetching funding for {} over {} windows", symbol, windows.len());

        let mut rows = Vec::new();
        for window in &windows {
            let page_rows = paginate_window(
                window,
                FUNDING_PAGE_LIMIT,
                self.shutdown.as_ref(),
                |start_time, end_time| {
                    let market = self.market.clone();
                    let request = FundingHistoryRequest {
                        category: Category::Linear,
                        symbol: symbol.to_string(),
                        start_time,
                        end_time,
                        limit: FUNDING_PAGE_LIMIT,
                    };
                    async move { market.get_funding_rate_history(&request).await }
                },
            )
            .await?;
            rows.extend(page_rows);
        }

        let merged = merge_rows(rows);
        if merged.is_empty() {
            info!("No funding history for {}", symbol);
            return Ok(TaskOutcome::NoData);
        }

        let mut writer = CsvFundingWriter::new(&target)?;
        writer.write_fundings(&merged)?;
        writer.close()?;

        info!(
            "Wrote {} funding rates for {} to {}",
            merged.len(),
            symbol,
            target.display()
        );
        Ok(TaskOutcome::Completed)
    }

    /// Sync klines of every ticker of `category`, or of the configured symbols
    pub async fn sync_all_klines(
        &self,
        category: Category,
        interval: Interval,
    ) -> DownloadResult<BatchReport> {
        let symbols = match &self.config.symbols {
            Some(symbols) => symbols.clone(),
            None => self
                .market
                .get_tickers(category)
                .await?
                .into_iter()
                .map(|t| t.symbol)
                .collect(),
        };
        info!(
            "Syncing {} klines ({}) for {} symbols",
            category,
            interval,
            symbols.len()
        );

        let report = self
            .symbol_scheduler("klines", symbols.len())
            .run_batches(symbols, |symbol: String| async move {
                self.sync_klines(category, interval, &symbol).await
            })
            .await?;

        info!("Kline sync finished: {}", report);
        Ok(report)
    }

    /// Sync the klines of one symbol
    pub async fn sync_klines(
        &self,
        category: Category,
        interval: Interval,
        symbol: &str,
    ) -> DownloadResult<TaskOutcome> {
        let target = self.resolver.resolve_klines(category, symbol, interval);
        if is_complete(&target) {
            debug!("Skipping klines for {}, {} exists", symbol, target.display());
            return Ok(TaskOutcome::Skipped);
        }

        let end = self.config.history_end_or_now();
        let Some(first_bar) = self.discover_first_bar(category, symbol, end).await? else {
            info!("No klines for {} {}", category, symbol);
            return Ok(TaskOutcome::NoData);
        };

        let span = Duration::minutes(interval.to_minutes() * KLINE_PAGE_LIMIT as i64);
        let windows = generate_windows(first_bar.max(self.config.history_start), end, span);
        info!(
            "Fetching {} {} klines ({}) from {} in {} windows",
            category,
            symbol,
            interval,
            first_bar,
            windows.len()
        );

        let scheduler = BatchScheduler::new(self.config.batch_size, "kline_window")
            .with_policy(self.config.error_policy)
            .with_shutdown(self.shutdown.clone());
        let report = scheduler
            .run_batches(windows, |window| {
                self.sync_kline_window(category, interval, symbol, window)
            })
            .await?;

        let parts_dir = self.resolver.kline_parts_dir(category, symbol, interval);
        if !report.is_success() {
            return Err(DownloadError::Incomplete(format!(
                "{} of {} windows failed for {}, parts kept in {}",
                report.failed,
                report.total(),
                symbol,
                parts_dir.display()
            )));
        }

        let merged = merge_rows(read_parts(&parts_dir)?);
        if merged.is_empty() {
            remove_parts(&parts_dir);
            info!("No klines for {} {} in range", category, symbol);
            return Ok(TaskOutcome::NoData);
        }

        let mut writer = CsvKlineWriter::new(&target, CsvLayout::Merged)?;
        writer.write_klines(&merged)?;
        writer.close()?;
        remove_parts(&parts_dir);

        info!(
            "Wrote {} klines for {} to {}",
            merged.len(),
            symbol,
            target.display()
        );
        Ok(TaskOutcome::Completed)
    }

    /// Start of the oldest bar, found with one monthly page anchored at the
    /// history start
    async fn discover_first_bar(
        &self,
        category: Category,
        symbol: &str,
        end: DateTime<Utc>,
    ) -> DownloadResult<Option<DateTime<Utc>>> {
        if shutdown::is_requested(self.shutdown.as_ref()) {
            return Err(DownloadError::Cancelled);
        }

        let request = KlineRequest {
            category,
            symbol: symbol.to_string(),
            interval: Interval::OneMonth,
            start: self.config.history_start.timestamp_millis(),
            end: end.timestamp_millis(),
            limit: KLINE_PAGE_LIMIT,
        };
        let bars = self.market.get_kline(&request).await?;
        Ok(bars.iter().map(|bar| bar.start_time).min())
    }

    async fn sync_kline_window(
        &self,
        category: Category,
        interval: Interval,
        symbol: &str,
        window: TimeWindow,
    ) -> DownloadResult<TaskOutcome> {
        let part = self
            .resolver
            .resolve_kline_part(category, symbol, interval, window.start, window.end);
        if is_complete(&part) {
            debug!("Reusing {}", part.display());
            return Ok(TaskOutcome::Skipped);
        }

        let rows = paginate_window(
            &window,
            KLINE_PAGE_LIMIT,
            self.shutdown.as_ref(),
            |start, end| {
                let market = self.market.clone();
                let request = KlineRequest {
                    category,
                    symbol: symbol.to_string(),
                    interval,
                    start,
                    end,
                    limit: KLINE_PAGE_LIMIT,
                };
                async move { market.get_kline(&request).await }
            },
        )
        .await?;

        // Written even when empty so the window is not fetched again.
        let mut writer = CsvKlineWriter::new(&part, CsvLayout::Intermediate)?;
        writer.write_klines(&merge_rows(rows))?;
        let written = writer.rows_written();
        writer.close()?;

        debug!("Window {} of {}: {} klines", window, symbol, written);
        Ok(if written == 0 {
            TaskOutcome::NoData
        } else {
            TaskOutcome::Completed
        })
    }
}

/// Window bounds encoded in a part file stem (`{start_ms}_{end_ms}`)
fn part_bounds(path: &Path) -> Option<(i64, i64)> {
    let (start, end) = path.file_stem()?.to_str()?.split_once('_')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Intermediate files of a parts directory, oldest window first.
///
/// Of several parts sharing a start only the one reaching furthest is kept;
/// the others are trailing windows cut short by an earlier run.
fn part_files(parts_dir: &Path) -> Result<Vec<PathBuf>, OutputError> {
    let entries = match std::fs::read_dir(parts_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OutputError::IoError(format!(
                "Failed to read {}: {}",
                parts_dir.display(),
                e
            )))
        }
    };

    let mut parts: BTreeMap<i64, (i64, PathBuf)> = BTreeMap::new();
    for entry in entries {
        let path = entry
            .map_err(|e| OutputError::IoError(format!("{}: {}", parts_dir.display(), e)))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some((start_ms, end_ms)) = part_bounds(&path) else {
            warn!("Ignoring unexpected file {}", path.display());
            continue;
        };
        match parts.get(&start_ms) {
            Some((kept_end, _)) if *kept_end >= end_ms => {
                debug!("Ignoring superseded part {}", path.display())
            }
            _ => {
                parts.insert(start_ms, (end_ms, path));
            }
        }
    }

    Ok(parts.into_values().map(|(_, path)| path).collect())
}

/// Every row of every intermediate file, oldest window first
fn read_parts(parts_dir: &Path) -> Result<Vec<Kline>, OutputError> {
    let mut rows = Vec::new();
    for path in part_files(parts_dir)? {
        rows.extend(read_kline_part(&path)?);
    }
    Ok(rows)
}

fn remove_parts(parts_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(parts_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", parts_dir.display(), e);
        }
    }
}
