use std::{future::Future, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::error::Error;

/// Shared retry policy for all retryable source I/O: schema discovery,
/// granularity discovery and identifier listing.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(5000),
        }
    }
}

/// Cooperative cancellation check, polled before expensive work and between
/// retry attempts. Implementations are expected to cache reads so polling
/// stays cheap.
#[async_trait]
pub trait CancellationProbe: Send + Sync {
    async fn is_cancelled(&self, task_id: i64) -> Result<bool, Error>;
}

/// A probe that never cancels, for call sites outside any task scope.
pub struct NeverCancelled;

#[async_trait]
impl CancellationProbe for NeverCancelled {
    async fn is_cancelled(&self, _task_id: i64) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Runs `op` under the policy, re-checking the kill flag before every
/// attempt so a cancelled task does not burn through its retry budget
/// against a dead endpoint. The last error is re-raised once attempts are
/// exhausted.
pub async fn run_retryable<T, F, Fut>(
    policy: &RetryPolicy,
    probe: &dyn CancellationProbe,
    task_id: i64,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, Error>> + Send,
    T: Send,
{
    let mut attempts_left = policy.max_attempts.max(1);
    loop {
        if probe.is_cancelled(task_id).await? {
            return Err(Error::Cancelled(
                "kill flag observed before retry attempt".to_string(),
            ));
        }

        attempts_left -= 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e @ Error::Cancelled(_)) => return Err(e),
            Err(e) if attempts_left > 0 => {
                warn!(
                    task_id,
                    retries_left = attempts_left,
                    error = %e,
                    "retryable operation failed, waiting before next attempt"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct CancelledAfterFirstPoll(AtomicBool);

    #[async_trait]
    impl CancellationProbe for CancelledAfterFirstPoll {
        async fn is_cancelled(&self, _task_id: i64) -> Result<bool, Error> {
            Ok(self.0.swap(true, Ordering::SeqCst))
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = run_retryable(&fast_policy(), &NeverCancelled, 1, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::TransientSource("503".into()))
            } else {
                Ok(42u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn last_error_is_reraised_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = run_retryable(&fast_policy(), &NeverCancelled, 1, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::TransientSource("down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::TransientSource(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_between_attempts_stops_retrying() {
        let probe = CancelledAfterFirstPoll(AtomicBool::new(false));
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = run_retryable(&fast_policy(), &probe, 1, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::TransientSource("down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
