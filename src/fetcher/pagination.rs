//! Time windows and backwards pagination inside a window
//!
//! Bybit history endpoints return the newest rows first and cap each page
//! (200 funding rows, 1000 klines). A requested range is therefore cut into
//! [`TimeWindow`]s, and inside each window pages are requested from the window
//! end towards its start until a page comes back short.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tracing::debug;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::output::csv::TIMESTAMP_FORMAT;
use crate::shutdown::{self, SharedShutdown};
use crate::TimeKeyed;

/// Maximum pages per window before giving up
const MAX_ITERATIONS: usize = 10_000;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window from `start` to `end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Inclusive start in milliseconds
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Inclusive end in milliseconds, as the API expects
    pub fn last_ms(&self) -> i64 {
        self.end.timestamp_millis() - 1
    }

    /// Whether `ts` falls inside the window
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(TIMESTAMP_FORMAT),
            self.end.format(TIMESTAMP_FORMAT)
        )
    }
}

/// Consecutive windows of `span` covering `[start, end)`.
///
/// The last window is cut at `end`. Empty when the range is empty or the span
/// is not positive.
pub fn generate_windows(start: DateTime<Utc>, end: DateTime<Utc>, span: Duration) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if span <= Duration::zero() {
        return windows;
    }

    let mut current = start;
    while current < end {
        let next = current.checked_add_signed(span).map_or(end, |n| n.min(end));
        windows.push(TimeWindow::new(current, next));
        current = next;
    }
    windows
}

/// Collect every row of `window`, paging backwards from its end.
///
/// `fetch_page(start_ms, end_ms)` requests one page with inclusive bounds.
/// Paging continues while a page is full and its oldest row is still after
/// the window start. Rows outside the window are dropped. Rows are returned
/// in page order; callers sort.
pub async fn paginate_window<T, F, Fut>(
    window: &TimeWindow,
    page_limit: usize,
    shutdown: Option<&SharedShutdown>,
    mut fetch_page: F,
) -> FetcherResult<Vec<T>>
where
    T: TimeKeyed,
    F: FnMut(i64, i64) -> Fut,
    Fut: Future<Output = FetcherResult<Vec<T>>>,
{
    let start_ms = window.start_ms();
    let mut end_ms = window.last_ms();
    let mut rows = Vec::new();
    let mut iteration = 0;

    while end_ms >= start_ms {
        if iteration >= MAX_ITERATIONS {
            return Err(FetcherError::PaginationError(format!(
                "Max iterations ({MAX_ITERATIONS}) exceeded in window {window}. Last end: {end_ms}"
            )));
        }
        if shutdown::is_requested(shutdown) {
            return Err(FetcherError::Cancelled);
        }

        let page = fetch_page(start_ms, end_ms).await?;
        let page_len = page.len();
        let oldest_ms = page.iter().map(|row| row.timestamp().timestamp_millis()).min();

        debug!(
            "Page {} of window {}: {} rows",
            iteration + 1,
            window,
            page_len
        );

        rows.extend(page.into_iter().filter(|row| window.contains(row.timestamp())));

        let Some(oldest_ms) = oldest_ms else {
            break;
        };
        if page_len < page_limit || oldest_ms <= start_ms || oldest_ms > end_ms {
            break;
        }

        end_ms = oldest_ms - 1;
        iteration += 1;
    }

    Ok(rows)
}
