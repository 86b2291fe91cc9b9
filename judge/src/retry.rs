//! Bounded retry with linear backoff for model-facing operations.

use crate::error::{JudgeError, JudgeResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry parameters shared by both agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Linear backoff unit (in milliseconds)
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Delay to wait after `attempt` (1-based) failed: `base × attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Run `operation` until it succeeds or the policy's attempts are spent.
///
/// Every error is retried. The closure receives the 1-based attempt
/// number. When all attempts fail the last error is wrapped in
/// [`JudgeError::RetriesExhausted`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> JudgeResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = JudgeResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} attempt {}/{} failed, retrying in {:?}: {}",
                    operation, attempt, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("{} failed after {} attempts: {}", operation, attempt, e);
                return Err(JudgeError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert!(policy.validate().is_ok());
        assert!(RetryPolicy::new(0, 10).validate().is_err());
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(RetryPolicy::new(3, 0).delay_after(2), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 0);

        let result = retry_with_backoff(&policy, "Flaky op", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(JudgeError::Parse("not json".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 0);

        let err = retry_with_backoff(&policy, "Answer evaluation", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<(), _>(JudgeError::EmptyResult(format!(
                    "no valid answers (attempt {})",
                    attempt
                )))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match &err {
            JudgeError::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(*attempts, 3);
                assert!(last_error.contains("attempt 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, 0);
        let _ = retry_with_backoff(&policy, "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(JudgeError::Parse("x".to_string())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
