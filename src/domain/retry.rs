//! Bounded retry executor.
//!
//! Runs an attempt up to `limit` times. The attempt's error class decides
//! what happens next: soft failures are retried (with optional exponential
//! backoff), recoverable failures stop immediately without another
//! attempt, fatal failures abort and propagate.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::error::{Classify, ErrorClass};

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Terminal outcome of a retried operation.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed softly.
    #[error("retry limit reached after {attempts} attempts: {last}")]
    LimitReached { attempts: u32, last: E },

    /// An attempt signalled that retrying is pointless.
    #[error("not retried after attempt {attempts}: {error}")]
    Abandoned { attempts: u32, error: E },

    /// An attempt hit a contract violation.
    #[error("fatal failure: {0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The underlying failure of the last attempt.
    pub fn inner(&self) -> &E {
        match self {
            Self::LimitReached { last, .. } => last,
            Self::Abandoned { error, .. } => error,
            Self::Fatal(e) => e,
        }
    }

    /// Whether the failure must abort the enclosing unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Retry executor with a fixed attempt limit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (>= 1).
    limit: u32,
    /// Delay before the second attempt; doubles after each further failure.
    base_delay: Duration,
}

impl RetryPolicy {
    /// Policy without delay between attempts. A zero limit is raised to 1.
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            base_delay: Duration::ZERO,
        }
    }

    /// Add exponential backoff between soft failures.
    #[must_use]
    pub fn with_backoff(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Configured attempt limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Run `attempt` until it succeeds, fails terminally, or the limit is hit.
    ///
    /// `attempt` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let error = match attempt(attempts).await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation = label, attempts, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            match error.class() {
                ErrorClass::Fatal => return Err(RetryError::Fatal(error)),
                ErrorClass::Recoverable => {
                    warn!(operation = label, attempt = attempts, error = %error, "Not retryable, giving up");
                    return Err(RetryError::Abandoned { attempts, error });
                }
                ErrorClass::Soft if attempts >= self.limit => {
                    warn!(operation = label, attempts, error = %error, "Retry limit reached");
                    return Err(RetryError::LimitReached {
                        attempts,
                        last: error,
                    });
                }
                ErrorClass::Soft => {
                    let delay = self.backoff(attempts);
                    warn!(
                        operation = label,
                        attempt = attempts,
                        limit = self.limit,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Delay after the given failed attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::domain::error::FeedError;

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = Cell::new(0);
        let result: Result<u32, RetryError<FeedError>> = RetryPolicy::new(5)
            .execute("test", |n| {
                calls.set(calls.get() + 1);
                async move {
                    if n < 3 {
                        Err(FeedError::Timeout)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_limit_reached_after_soft_failures() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::new(4)
            .execute("test", |_| {
                calls.set(calls.get() + 1);
                async { Err(FeedError::RateLimited) }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::LimitReached { attempts: 4, .. })
        ));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_recoverable_stops_without_retry() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::new(10)
            .execute("test", |_| {
                calls.set(calls.get() + 1);
                async { Err(FeedError::NotFound("XYZ/EUR".into())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Abandoned { attempts: 1, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_fatal_propagates_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::new(10)
            .execute("test", |_| {
                calls.set(calls.get() + 1);
                async { Err(FeedError::Contract("bad input".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.inner(), &FeedError::Contract("bad input".into()));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_limit_raised_to_one() {
        assert_eq!(RetryPolicy::new(0).limit(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(3).with_backoff(Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(30), MAX_BACKOFF);
    }
}
