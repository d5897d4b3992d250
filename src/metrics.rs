//! Prometheus metrics for downloads
//!
//! Counters and histograms are recorded through the `metrics` facade. They are
//! no-ops until [`init_metrics`] installs the Prometheus exporter, so library
//! users that never call it pay nothing.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Install the Prometheus exporter listening on `addr`.
///
/// Idempotent: a second call is a no-op.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests issued to the file server and the REST API"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Retry attempts after transient failures"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Time to response headers"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "download_tasks_total",
        Unit::Count,
        "Finished download tasks by job type and outcome"
    );

    *initialized = true;
    info!("Metrics endpoint listening on {}", addr);
    Ok(())
}

/// Whether the exporter has been installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

fn next_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP attempt
pub struct HttpRequestMetrics {
    target: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start timing an attempt against `target` ("archive" or "api")
    pub fn start(target: &'static str, attempt: u32) -> Self {
        Self {
            target,
            start_time: Instant::now(),
            correlation_id: next_correlation_id(),
            attempt,
        }
    }

    /// Record a response with the given status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "target" => self.target,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "target" => self.target)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                target = self.target,
                attempt = self.attempt,
                "Rate limited (429)"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            target = self.target,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record an attempt that produced no response
    pub fn record_network_error(&self, error: &str) {
        counter!(
            "http_requests_total",
            "target" => self.target,
            "status" => "network_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            target = self.target,
            attempt = self.attempt,
            error = %error,
            "Network error"
        );
    }

    /// Correlation id of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a backoff before retry number `attempt`
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff"
    );
}

/// Outcome counters for one kind of task
#[derive(Debug, Clone, Copy)]
pub struct DownloadMetrics {
    job_type: &'static str,
}

impl DownloadMetrics {
    /// Counters labelled with `job_type`
    pub fn new(job_type: &'static str) -> Self {
        Self { job_type }
    }

    fn record(&self, outcome: &'static str) {
        counter!(
            "download_tasks_total",
            "job_type" => self.job_type,
            "outcome" => outcome,
        )
        .increment(1);
    }

    /// A task that produced output
    pub fn record_success(&self) {
        self.record("completed");
    }

    /// A task whose output already existed
    pub fn record_skipped(&self) {
        self.record("skipped");
    }

    /// A task that failed
    pub fn record_failure(&self) {
        self.record("failed");
    }
}
