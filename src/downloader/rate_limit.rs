//! Request-count rate limiting for the REST API

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Allows at most `max_requests` acquisitions per rolling `window`
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: usize,
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl RateLimiter {
    /// Create a request-based rate limiter
    pub fn request_based(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            semaphore: Arc::new(Semaphore::new(max_requests)),
            window,
        }
    }

    /// Configured budget per window
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for one request slot.
    ///
    /// The permit stays held for the whole window and is released by a
    /// detached task, so bursts are capped regardless of request latency.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire permits
    #[error("failed to acquire rate limit permits: {0}")]
    AcquireError(String),
}
