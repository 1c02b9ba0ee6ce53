//! Budgeted retry with exponential backoff for schedule API calls.
//!
//! Only [`ErrorClass::Transient`] failures are retried. Permanent and
//! not-found errors are returned on first sight. Retries continue until
//! the policy's time budget would be exceeded by the next sleep, at which
//! point the last transient error is returned.
//!
//! The wrapped operation may have partially applied before a transient
//! failure; callers only wrap operations that are safe to repeat. Writes
//! that are not (a create without a client-supplied key) go through
//! [`retry_unapplied`] instead.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ApiError, Classify, ErrorClass};

/// Default total retry budget per call (5 minutes).
pub const DEFAULT_BUDGET_SECS: u64 = 300;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms, ...).
const BASE_DELAY_MS: u64 = 200;

/// Upper bound on a single backoff sleep.
const MAX_DELAY_MS: u64 = 10_000;

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total wall time allowed for one call including all retries.
    pub budget: Duration,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to each individual delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(DEFAULT_BUDGET_SECS),
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Default policy with `ONCALL_RETRY_BUDGET_SECS` applied if set.
    pub fn from_env() -> Self {
        let budget = std::env::var("ONCALL_RETRY_BUDGET_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BUDGET_SECS);
        Self::default().with_budget(Duration::from_secs(budget))
    }

    /// Same backoff shape, different total budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            budget: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or the budget runs out.
///
/// `operation` names the call in log output.
pub async fn retry_until<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if err.class() != ErrorClass::Transient {
            return Err(err);
        }
        attempt = attempt.saturating_add(1);
        let delay = policy.delay_for(attempt);
        if started.elapsed().saturating_add(delay) > policy.budget {
            tracing::warn!(
                operation,
                attempts = attempt,
                budget = ?policy.budget,
                "retry budget exhausted: {err}"
            );
            return Err(err);
        }
        tracing::warn!(
            operation,
            attempt,
            "transient failure, retrying in {delay:?}: {err}"
        );
        tokio::time::sleep(delay).await;
    }
}

/// [`retry_until`] for writes that must not be repeated once the server
/// may have applied them.
///
/// Only failures for which [`ApiError::is_unapplied`] holds are retried.
/// Any other transient failure is returned as is, with its class intact.
pub async fn retry_unapplied<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let result = retry_until(policy, operation, || {
        let fut = op();
        async move { fut.await.map_err(Unapplied) }
    })
    .await;
    result.map_err(|Unapplied(err)| {
        if err.class() == ErrorClass::Transient {
            tracing::warn!(operation, "not retried, the write may have been applied: {err}");
        }
        err
    })
}

/// Narrows the retry class of an [`ApiError`] to failures known not to
/// have been applied.
struct Unapplied(ApiError);

impl Classify for Unapplied {
    fn class(&self) -> ErrorClass {
        match self.0.class() {
            ErrorClass::Transient if !self.0.is_unapplied() => ErrorClass::Permanent,
            class => class,
        }
    }
}

impl fmt::Display for Unapplied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(ErrorClass);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} test failure", self.0)
        }
    }

    impl Classify for TestError {
        fn class(&self) -> ErrorClass {
            self.0
        }
    }

    fn fast_policy(budget_ms: u64) -> RetryPolicy {
        RetryPolicy {
            budget: Duration::from_millis(budget_ms),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retry_until(&fast_policy(5_000), "test", || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError(ErrorClass::Transient))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retry_until(&fast_policy(5_000), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError(ErrorClass::Permanent))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().0, ErrorClass::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retry_until(&fast_policy(5_000), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError(ErrorClass::NotFound))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().0, ErrorClass::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_transient_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retry_until(&fast_policy(30), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError(ErrorClass::Transient))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().0, ErrorClass::Transient);
        assert!(calls.load(Ordering::SeqCst) > 1, "should retry at least once");
    }

    #[tokio::test]
    async fn zero_budget_makes_a_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retry_until(&RetryPolicy::no_retry(), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError(ErrorClass::Transient))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unapplied_writes_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = retry_unapplied(&fast_policy(5_000), "create", || {
            let c = c.clone();
            async move {
                match c.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(ApiError::status("POST /schedules", 429, "slow down")),
                    n => Ok(n),
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn possibly_applied_write_is_returned_unretried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = retry_unapplied(&fast_policy(5_000), "create", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::status("POST /schedules", 503, "upstream reset"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(policy.delay_for(64), Duration::from_millis(MAX_DELAY_MS));
    }
}
