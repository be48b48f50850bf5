//! Retry with exponential backoff for idempotent requests

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        std::cmp::min(Duration::from_millis(delay_ms as u64), self.max_delay)
    }

    /// Delay for `err`, honouring a server-provided `Retry-After`
    fn delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        match err {
            ApiError::RateLimited {
                retry_after: Some(after),
            } => std::cmp::min(*after, self.max_delay),
            _ => self.calculate_delay(attempt),
        }
    }
}

/// Parse a `Retry-After` header value (delta seconds or HTTP date)
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(Duration::from_secs_f64(seconds));
        }
    }
    httpdate::parse_http_date(value)
        .ok()
        .and_then(|at| at.duration_since(std::time::SystemTime::now()).ok())
}

/// Runs an operation, retrying retryable failures
#[derive(Debug, Clone, Default)]
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Request succeeded after {} retries", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.config.max_retries => {
                    if self.config.max_retries == 0 {
                        return Err(e);
                    }
                    return Err(ApiError::RetryLimitExceeded {
                        attempts: attempt + 1,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.config.delay_for(attempt, &e);
                    warn!(
                        "Request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
