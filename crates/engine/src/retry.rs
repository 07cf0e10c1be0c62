//! Bounded retry with exponential backoff.
//!
//! The engine itself never loops; callers that want automatic retries
//! (the API's sweep endpoint, batch jobs) wrap a dispatch pass in a
//! policy.

use std::future::Future;
use std::time::Duration;

use common::TransactionId;

use crate::outcome::ProcessOutcome;

/// Retry schedule for transient dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Backoff after the given 1-based attempt, doubling each time and
    /// capped at `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Runs `attempt` until it stops asking for a retry or the attempt
    /// budget runs out. Terminal outcomes are returned as-is.
    pub async fn run<F, Fut>(&self, transaction_id: TransactionId, mut attempt: F) -> ProcessOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProcessOutcome>,
    {
        let mut outcome = attempt().await;
        let mut tries = 1;
        while outcome.needs_retry && tries < self.max_attempts {
            let delay = self.backoff_after(tries);
            tracing::debug!(%transaction_id, tries, ?delay, "retrying dispatch pass");
            tokio::time::sleep(delay).await;
            outcome = attempt().await;
            tries += 1;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_after(4), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retries_until_the_pass_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = fast_policy(5)
            .run(TransactionId::new(), move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        ProcessOutcome::retryable("provider timeout")
                    } else {
                        ProcessOutcome::success()
                    }
                }
            })
            .await;

        assert!(outcome.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_respected() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = fast_policy(3)
            .run(TransactionId::new(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ProcessOutcome::retryable("still down")
                }
            })
            .await;

        assert!(!outcome.success);
        assert!(outcome.needs_retry);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = fast_policy(5)
            .run(TransactionId::new(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ProcessOutcome::failed("not approved")
                }
            })
            .await;

        assert!(!outcome.success);
        assert!(!outcome.needs_retry);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
