//! Bounded retry around one commit attempt.
//!
//! Only enumerated datastore conflicts (`ServiceError::is_transient`) are
//! retried; business failures return immediately. Every retry re-runs the
//! whole attempt from scratch, which re-validates stock and redraws a fresh
//! bill number, so retrying is always safe.

use crate::config::RetryConfig;
use crate::errors::ServiceError;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

lazy_static! {
    static ref COMMIT_RETRIES: IntCounter = IntCounter::new(
        "order_commit_retries_total",
        "Total number of retried commit attempts after transient conflicts"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs the operation up to `max_attempts` times with a fixed delay
    /// between attempts. An attempt exceeding the wall-clock budget counts
    /// as a transient failure. Exhaustion yields `MaxRetriesExceeded`
    /// wrapping the last cause.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 1u32;
        loop {
            let outcome = match timeout(self.policy.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::TransientConflict(format!(
                    "attempt exceeded {:?} budget",
                    self.policy.attempt_timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    COMMIT_RETRIES.inc();
                    warn!(
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "Transient conflict, retrying after delay"
                    );
                    sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(ServiceError::MaxRetriesExceeded {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    debug!(attempt = attempt, error = %err, "Fatal error, not retrying");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result = executor
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ServiceError::TransientConflict("lock".to_string()))
                } else {
                    Ok("committed")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "committed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::QuotaExceeded {
                    used: 50,
                    ceiling: 50,
                })
            })
            .await;
        assert_matches!(result, Err(ServiceError::QuotaExceeded { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_cause() {
        let executor = RetryExecutor::new(fast_policy());
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::TransientConflict("still locked".to_string()))
            })
            .await;
        let err = result.unwrap_err();
        assert_matches!(
            &err,
            ServiceError::MaxRetriesExceeded { attempts: 3, last } if last.is_transient()
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timed_out_attempt_counts_as_transient() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(10),
        });
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = executor
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert_matches!(result, Err(ServiceError::MaxRetriesExceeded { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
