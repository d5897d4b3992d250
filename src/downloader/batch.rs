//! Bounded-concurrency batch execution
//!
//! Work items are cut into consecutive chunks of at most `batch_size`. All
//! items of a chunk run concurrently and the scheduler waits for every one of
//! them to settle before starting the next chunk. A failing item never
//! cancels its siblings.

use futures::future::join_all;
use indicatif::ProgressBar;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, info, warn};

use super::config::DEFAULT_BATCH_SIZE;
use super::{DownloadError, DownloadResult};
use crate::metrics::DownloadMetrics;
use crate::shutdown::{self, SharedShutdown};

/// What to do once a task of a batch has failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and keep going
    #[default]
    Continue,
    /// Finish the current batch, then abort
    FailFast,
}

/// Successful result of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Output was produced
    Completed,
    /// Output already existed
    Skipped,
    /// The source had nothing to write
    NoData,
}

/// A task that failed, with its error rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Display form of the work item
    pub item: String,
    /// Display form of the error
    pub error: String,
}

impl Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.item, self.error)
    }
}

/// Tally of a scheduled run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Tasks that produced output
    pub completed: usize,
    /// Tasks whose output already existed
    pub skipped: usize,
    /// Tasks with nothing to write
    pub no_data: usize,
    /// Tasks that failed
    pub failed: usize,
    /// One entry per failed task
    pub failures: Vec<TaskFailure>,
}

impl BatchReport {
    /// Number of tasks accounted for
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.no_data + self.failed
    }

    /// Whether no task failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Count one task outcome
    pub fn record<E: Display>(&mut self, item: impl Display, result: &Result<TaskOutcome, E>) {
        match result {
            Ok(TaskOutcome::Completed) => self.completed += 1,
            Ok(TaskOutcome::Skipped) => self.skipped += 1,
            Ok(TaskOutcome::NoData) => self.no_data += 1,
            Err(e) => {
                self.failed += 1;
                self.failures.push(TaskFailure {
                    item: item.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Add another report's counts to this one
    pub fn absorb(&mut self, other: BatchReport) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.no_data += other.no_data;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

impl Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} without data, {} failed",
            self.completed, self.skipped, self.no_data, self.failed
        )
    }
}

/// Split `items` into consecutive chunks of at most `n` (zero is treated as
/// one). Order is preserved and the chunks concatenate back to the input.
pub fn partition<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(n));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(n).collect());
    }
    batches
}

/// Runs work items batch by batch
#[derive(Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    policy: ErrorPolicy,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
    metrics: DownloadMetrics,
}

impl BatchScheduler {
    /// Scheduler with `batch_size` tasks per batch; `job_type` labels metrics
    pub fn new(batch_size: usize, job_type: &'static str) -> Self {
        Self {
            batch_size: batch_size.max(1),
            policy: ErrorPolicy::default(),
            shutdown: None,
            progress: None,
            metrics: DownloadMetrics::new(job_type),
        }
    }

    /// Set the error policy
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop before the next batch once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Advance `progress` once per finished task
    pub fn with_progress(mut self, progress: Option<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    /// Tasks per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `worker` over every item.
    ///
    /// Returns the tally of all batches that ran. Fails with
    /// [`DownloadError::Cancelled`] if shutdown is requested between batches
    /// and with [`DownloadError::BatchFailed`] after a batch with failures
    /// under [`ErrorPolicy::FailFast`].
    pub async fn run_batches<T, F, Fut, E>(&self, items: Vec<T>, worker: F) -> DownloadResult<BatchReport>
    where
        T: Display,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<TaskOutcome, E>>,
        E: Display,
    {
        let batches = partition(items, self.batch_size);
        let batch_count = batches.len();
        let mut report = BatchReport::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if shutdown::is_requested(self.shutdown.as_ref()) {
                warn!(
                    "Shutdown requested, stopping before batch {}/{}",
                    index + 1,
                    batch_count
                );
                return Err(DownloadError::Cancelled);
            }

            debug!(
                "Starting batch {}/{} with {} tasks",
                index + 1,
                batch_count,
                batch.len()
            );

            let labels: Vec<String> = batch.iter().map(ToString::to_string).collect();
            let results = join_all(batch.into_iter().map(|item| {
                let task = worker(item);
                async move {
                    let result = task.await;
                    if let Some(pb) = &self.progress {
                        pb.inc(1);
                    }
                    result
                }
            }))
            .await;

            let mut batch_report = BatchReport::default();
            for (label, result) in labels.into_iter().zip(results) {
                match &result {
                    Ok(TaskOutcome::Completed) => self.metrics.record_success(),
                    Ok(TaskOutcome::Skipped) | Ok(TaskOutcome::NoData) => {
                        self.metrics.record_skipped()
                    }
                    Err(e) => {
                        self.metrics.record_failure();
                        error!("Task {} failed: {}", label, e);
                    }
                }
                batch_report.record(&label, &result);
            }

            info!(
                "Batch {}/{} finished: {}",
                index + 1,
                batch_count,
                batch_report
            );

            let batch_failed = batch_report.failed;
            report.absorb(batch_report);

            if batch_failed > 0 && self.policy == ErrorPolicy::FailFast {
                return Err(DownloadError::BatchFailed {
                    failed: batch_failed,
                    details: report
                        .failures
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "),
                });
            }
        }

        Ok(report)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, "default")
    }
}
