use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{AppError, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_STEP_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry of a remote call on Slack rate-limit signals.
///
/// The same policy wraps every call site: channel listing, history, thread
/// replies, search and user lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fallback delay when Slack gives no retry interval
    pub base_delay: Duration,
    /// Added to the fallback delay for each retry already made
    pub step_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            step_delay: DEFAULT_STEP_DELAY,
        }
    }
}

impl RetryPolicy {
    /// How long to wait before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32, retry_after_secs: u64) -> Duration {
        if retry_after_secs > 0 {
            Duration::from_secs(retry_after_secs)
        } else {
            self.base_delay + self.step_delay * retry
        }
    }

    /// Invoke `op`, sleeping and retrying while it reports a rate limit.
    ///
    /// Any other error is returned immediately. Once `max_attempts` calls
    /// have been rate limited, the last error is returned.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut retry = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(AppError::SlackRateLimit { retry_after_secs }) if retry + 1 < max_attempts => {
                    let delay = self.backoff(retry, retry_after_secs);
                    debug!(
                        "rate limited, retrying in {}s (attempt {}/{})",
                        delay.as_secs(),
                        retry + 2,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract the wait interval from a message like "rate limit exceeded, retry after 10s".
///
/// Returns 0 when the phrase is missing or the value is not a number.
pub fn parse_retry_after(text: &str) -> u64 {
    let Some((_, rest)) = text.split_once("retry after ") else {
        return 0;
    };

    rest.trim()
        .trim_end_matches('s')
        .trim()
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited(secs: u64) -> AppError {
        AppError::SlackRateLimit {
            retry_after_secs: secs,
        }
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("retry after 10s"), 10);
        assert_eq!(parse_retry_after("slack rate limit exceeded, retry after 30s"), 30);
        assert_eq!(parse_retry_after("retry after abc"), 0);
        assert_eq!(parse_retry_after("rate limit exceeded"), 0);
        assert_eq!(parse_retry_after(""), 0);
    }

    #[test]
    fn test_backoff_prefers_advised_interval() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, 7), Duration::from_secs(7));
        assert_eq!(policy.backoff(2, 7), Duration::from_secs(7));
    }

    #[test]
    fn test_backoff_fallback_grows_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0, 0), Duration::from_secs(10));
        assert_eq!(policy.backoff(1, 0), Duration::from_secs(15));
        assert_eq!(policy.backoff(2, 0), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_twice_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err(rate_limited(0)) } else { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_advised_interval() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let started = Instant::now();

        let result = policy
            .call(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited(3))
                } else {
                    Ok(1)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = policy
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(rate_limited(u64::from(n) + 1))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(AppError::SlackRateLimit { retry_after_secs: 3 })
        ));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::SlackApi("invalid_auth".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AppError::SlackApi(_))));
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };

        let result: Result<()> = policy
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(rate_limited(1))
            })
            .await;

        assert!(result.unwrap_err().is_rate_limit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
